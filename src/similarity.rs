//! TF-IDF similarity between paper summaries and average-linkage clustering.

use std::collections::{BTreeMap, HashMap};

const MAX_FEATURES: usize = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityAnalysis {
    pub ids: Vec<String>,
    /// Cosine similarity, `ids.len()` square.
    pub matrix: Vec<Vec<f64>>,
    /// Member ids per cluster, numbered by first member.
    pub clusters: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarPair {
    pub a: String,
    pub b: String,
    pub score: f64,
}

impl SimilarityAnalysis {
    pub fn top_pairs(&self, limit: usize) -> Vec<SimilarPair> {
        let n = self.ids.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                pairs.push(SimilarPair {
                    a: self.ids[i].clone(),
                    b: self.ids[j].clone(),
                    score: self.matrix[i][j],
                });
            }
        }
        pairs.sort_by(|x, y| y.score.total_cmp(&x.score));
        pairs.truncate(limit);
        pairs
    }
}

/// `docs` pairs an id with the text to compare.
pub fn analyze(docs: &[(String, String)], n_clusters: usize) -> SimilarityAnalysis {
    let ids: Vec<String> = docs.iter().map(|(id, _)| id.clone()).collect();
    match docs.len() {
        0 => {
            return SimilarityAnalysis {
                ids,
                matrix: Vec::new(),
                clusters: Vec::new(),
            }
        }
        1 => {
            return SimilarityAnalysis {
                clusters: vec![ids.clone()],
                ids,
                matrix: vec![vec![1.0]],
            }
        }
        _ => {}
    }

    let vectors = tfidf(docs.iter().map(|(_, text)| text.as_str()));
    let n = vectors.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let sim = dot(&vectors[i], &vectors[j]);
            matrix[i][j] = sim;
            matrix[j][i] = sim;
        }
    }

    let groups = average_linkage(&matrix, n_clusters.clamp(1, n));
    let clusters = groups
        .into_iter()
        .map(|members| members.into_iter().map(|i| ids[i].clone()).collect())
        .collect();
    SimilarityAnalysis {
        ids,
        matrix,
        clusters,
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

fn terms(text: &str) -> Vec<String> {
    let words = tokens(text);
    let bigrams: Vec<String> = words.windows(2).map(|w| format!("{} {}", w[0], w[1])).collect();
    words.into_iter().chain(bigrams).collect()
}

/// L2-normalized sparse TF-IDF vectors with smoothed idf.
fn tfidf<'a>(texts: impl Iterator<Item = &'a str>) -> Vec<HashMap<usize, f64>> {
    let counts: Vec<HashMap<String, f64>> = texts
        .map(|text| {
            let mut tf = HashMap::new();
            for term in terms(text) {
                *tf.entry(term).or_insert(0.0) += 1.0;
            }
            tf
        })
        .collect();

    let mut corpus_freq: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for doc in &counts {
        for (term, count) in doc {
            let entry = corpus_freq.entry(term.as_str()).or_insert((0.0, 0.0));
            entry.0 += count;
            entry.1 += 1.0;
        }
    }
    let mut vocab: Vec<(&str, f64, f64)> = corpus_freq
        .into_iter()
        .map(|(term, (total, df))| (term, total, df))
        .collect();
    vocab.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    vocab.truncate(MAX_FEATURES);

    let n = counts.len() as f64;
    let index: HashMap<&str, (usize, f64)> = vocab
        .iter()
        .enumerate()
        .map(|(i, (term, _, df))| (*term, (i, ((1.0 + n) / (1.0 + df)).ln() + 1.0)))
        .collect();

    counts
        .iter()
        .map(|doc| {
            let mut vector: HashMap<usize, f64> = doc
                .iter()
                .filter_map(|(term, tf)| {
                    index
                        .get(term.as_str())
                        .map(|(column, idf)| (*column, tf * idf))
                })
                .collect();
            let norm = vector.values().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                vector.values_mut().for_each(|v| *v /= norm);
            }
            vector
        })
        .collect()
}

fn dot(a: &HashMap<usize, f64>, b: &HashMap<usize, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(k, v)| large.get(k).map(|w| v * w))
        .sum()
}

/// Merges the pair of clusters with the smallest mean cosine distance until
/// `k` remain. Output is ordered by each cluster's first member.
fn average_linkage(similarity: &[Vec<f64>], k: usize) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = (0..similarity.len()).map(|i| vec![i]).collect();
    while clusters.len() > k {
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let mut total = 0.0;
                for &i in &clusters[a] {
                    for &j in &clusters[b] {
                        total += 1.0 - similarity[i][j];
                    }
                }
                let mean = total / (clusters[a].len() * clusters[b].len()) as f64;
                if best.map_or(true, |(_, _, d)| mean < d) {
                    best = Some((a, b, mean));
                }
            }
        }
        let Some((a, b, _)) = best else { break };
        let merged = clusters.remove(b);
        clusters[a].extend(merged);
    }
    for cluster in &mut clusters {
        cluster.sort_unstable();
    }
    clusters.sort_by_key(|c| c[0]);
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[(&str, &str)]) -> Vec<(String, String)> {
        texts
            .iter()
            .map(|(id, text)| (id.to_string(), text.to_string()))
            .collect()
    }

    #[test]
    fn degenerate_corpora() {
        let empty = analyze(&[], 3);
        assert!(empty.matrix.is_empty());
        assert!(empty.clusters.is_empty());

        let single = analyze(&docs(&[("only", "a lonely paper")]), 3);
        assert_eq!(single.matrix, vec![vec![1.0]]);
        assert_eq!(single.clusters, vec![vec!["only".to_string()]]);
        assert!(single.top_pairs(10).is_empty());
    }

    #[test]
    fn related_summaries_score_higher_and_cluster_together() {
        let analysis = analyze(
            &docs(&[
                ("moe-a", "sparse mixture of experts routing improves transformer scaling"),
                ("graph", "graph neural networks for molecule property prediction"),
                ("moe-b", "mixture of experts routing with sparse gating for transformer models"),
            ]),
            2,
        );
        assert!((analysis.matrix[0][0] - 1.0).abs() < 1e-9);
        assert!(analysis.matrix[0][2] > analysis.matrix[0][1]);
        assert_eq!(
            analysis.clusters,
            vec![
                vec!["moe-a".to_string(), "moe-b".to_string()],
                vec!["graph".to_string()],
            ]
        );

        let top = analysis.top_pairs(10);
        assert_eq!(top.len(), 3);
        assert_eq!((top[0].a.as_str(), top[0].b.as_str()), ("moe-a", "moe-b"));
    }

    #[test]
    fn cluster_count_never_exceeds_papers() {
        let analysis = analyze(&docs(&[("a", "alpha beta"), ("b", "gamma delta")]), 5);
        assert_eq!(analysis.clusters.len(), 2);
    }

    #[test]
    fn tokens_skip_single_characters() {
        assert_eq!(tokens("A b-test, of X_y"), vec!["test", "of", "x_y"]);
    }
}

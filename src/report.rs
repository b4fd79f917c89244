use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::PipelineError;
use crate::pdf::PaperMetadata;
use crate::similarity::{self, SimilarityAnalysis};

pub const REPORT_FILE: &str = "summary.md";
const MAX_FIGURES: usize = 4;
const TOP_PAIRS: usize = 10;

/// Everything the report needs about one paper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperReport {
    pub paper_id: String,
    pub metadata: PaperMetadata,
    pub text_path: PathBuf,
    pub figures_paths: Vec<PathBuf>,
    pub summary: String,
}

impl PaperReport {
    pub fn new(
        metadata: PaperMetadata,
        text_path: PathBuf,
        figures_paths: Vec<PathBuf>,
        summary: String,
    ) -> Self {
        Self {
            paper_id: metadata.paper_id.clone(),
            metadata,
            text_path,
            figures_paths,
            summary,
        }
    }
}

/// Picks up to `max_count` paths spread evenly from first to last.
pub fn select_representative(paths: &[PathBuf], max_count: usize) -> Vec<PathBuf> {
    let n = paths.len();
    if n <= max_count {
        return paths.to_vec();
    }
    if max_count == 0 {
        return Vec::new();
    }
    let mut indices: Vec<usize> = if max_count == 1 {
        vec![n / 2]
    } else {
        (0..max_count)
            .map(|i| {
                let position = i as f64 * (n - 1) as f64 / (max_count - 1) as f64;
                position.round_ties_even() as usize
            })
            .collect()
    };
    indices.dedup();
    // fill rounding collisions with the unused index closest to the middle
    let middle = n / 2;
    let mut offset = 0;
    while indices.len() < max_count && offset < n {
        for candidate in [middle.checked_sub(offset), Some(middle + offset)]
            .into_iter()
            .flatten()
        {
            if candidate < n && !indices.contains(&candidate) && indices.len() < max_count {
                indices.push(candidate);
            }
        }
        offset += 1;
    }
    indices.into_iter().map(|i| paths[i].clone()).collect()
}

fn normalized(path: &Path) -> Vec<OsString> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut parts = Vec::new();
    for part in absolute.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            other => parts.push(other.as_os_str().to_os_string()),
        }
    }
    parts
}

/// Path of `target` as seen from `base`, for links inside the report.
fn relative_to(target: &Path, base: &Path) -> PathBuf {
    let target = normalized(target);
    let base = normalized(base);
    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for part in &target[common..] {
        out.push(part);
    }
    out
}

pub fn render_report<W: Write>(
    out: &mut W,
    report_dir: &Path,
    corpus_summary: &str,
    items: &[PaperReport],
    analysis: &SimilarityAnalysis,
    generated_at: DateTime<Utc>,
) -> io::Result<()> {
    writeln!(out, "# Research Digest")?;
    writeln!(out)?;
    writeln!(out, "Generated: {}", generated_at.to_rfc3339())?;
    writeln!(out, "Papers: {}", items.len())?;
    writeln!(out)?;
    writeln!(out, "## 1. Corpus Summary")?;
    writeln!(out)?;
    writeln!(out, "{}", corpus_summary.trim())?;
    writeln!(out)?;

    writeln!(out, "## 2. Similarities and Differences")?;
    writeln!(out)?;
    writeln!(out, "### Most Similar Pairs")?;
    if analysis.ids.len() >= 2 {
        writeln!(out, "| Paper A | Paper B | Similarity |")?;
        writeln!(out, "|---|---|---:|")?;
        for pair in analysis.top_pairs(TOP_PAIRS) {
            writeln!(out, "| {} | {} | {:.3} |", pair.a, pair.b, pair.score)?;
        }
    } else {
        writeln!(out, "Single paper: similarity table skipped")?;
    }
    writeln!(out)?;
    writeln!(out, "### Clusters")?;
    for (id, members) in analysis.clusters.iter().enumerate() {
        writeln!(out, "- Cluster {}: {}", id, members.join(", "))?;
    }
    writeln!(out)?;

    writeln!(out, "## 3. Paper Summaries")?;
    writeln!(out)?;
    for item in items {
        let meta = &item.metadata;
        writeln!(out, "### {} ({})", meta.display_title(), item.paper_id)?;
        writeln!(out)?;
        writeln!(out, "- Source: `{}`", meta.source_pdf.display())?;
        writeln!(out, "- Pages: {}", meta.page_count)?;
        if let Some(author) = &meta.author {
            writeln!(out, "- Author: {}", author)?;
        }
        if let Some(created) = &meta.creation_date {
            writeln!(out, "- Created: {}", created)?;
        }
        writeln!(out)?;

        let figures = select_representative(&item.figures_paths, MAX_FIGURES);
        if figures.is_empty() {
            writeln!(out, "Extracted figures: none")?;
        } else {
            writeln!(out, "Representative figures (up to {}):", MAX_FIGURES)?;
            writeln!(out)?;
            for path in &figures {
                let rel = relative_to(path, report_dir);
                let alt = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                writeln!(
                    out,
                    "<img src=\"{}\" alt=\"{}\" width=\"240\" />",
                    rel.display(),
                    alt
                )?;
            }
            writeln!(out)?;
        }
        writeln!(out)?;
        writeln!(out, "Summary:")?;
        writeln!(out)?;
        writeln!(out, "{}", item.summary.trim())?;
        writeln!(out)?;
    }
    Ok(())
}

/// Computes similarity over the summaries and writes `summary.md` into
/// `report_dir`.
pub fn write_report(
    report_dir: &Path,
    corpus_summary: &str,
    items: &[PaperReport],
    n_clusters: usize,
) -> Result<PathBuf, PipelineError> {
    let path = report_dir.join(REPORT_FILE);
    let report_err = |source: io::Error| PipelineError::Report {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(report_dir).map_err(report_err)?;

    let docs: Vec<(String, String)> = items
        .iter()
        .map(|it| (it.paper_id.clone(), it.summary.clone()))
        .collect();
    let analysis = similarity::analyze(&docs, n_clusters);
    let file = File::create(&path).map_err(report_err)?;
    let mut writer = BufWriter::new(file);
    render_report(&mut writer, report_dir, corpus_summary, items, &analysis, Utc::now())
        .and_then(|_| writer.flush())
        .map_err(report_err)?;
    Ok(path)
}

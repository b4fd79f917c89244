//! Map-reduce summarization: every chunk of a paper is summarized on its own,
//! the chunk summaries are combined into one structured paper summary, and
//! the paper summaries are finally synthesized into a corpus overview.

use std::fmt;

use tracing::debug;

use crate::chunk::{chunk_text, ChunkSettings};
use crate::error::CompletionError;
use crate::llm::{Completer, CompletionOptions, Message};
use crate::pdf::PaperMetadata;
use crate::progress::{PaperSnapshot, PaperStage, ProgressEvent, ProgressKind, ProgressObserver};
use crate::report::PaperReport;

const RESEARCH_ASSISTANT: &str = "You are a helpful research assistant.";
const SYNTHESIZER: &str = "You are an expert research synthesizer.";

pub const DEFAULT_CHUNK_SUMMARY_WORDS: &str = "120-160";

/// Target length for each chunk summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordConstraint {
    Exact(u32),
    Range { low: u32, high: u32 },
    /// Free-form wording used as given.
    Verbatim(String),
}

impl Default for WordConstraint {
    fn default() -> Self {
        WordConstraint::Range {
            low: 120,
            high: 160,
        }
    }
}

impl WordConstraint {
    /// `"150"` is exact, `"120-160"` a range; anything else non-empty is kept
    /// verbatim, including ranges whose bounds are zero or reversed. Empty
    /// input gives the default range.
    pub fn parse(raw: &str) -> Self {
        let compact: String = raw.trim().chars().filter(|c| *c != ' ').collect();
        if !compact.is_empty() && compact.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(words) = compact.parse() {
                return WordConstraint::Exact(words);
            }
        } else if let Some((low, high)) = compact.split_once('-') {
            if let (Ok(low), Ok(high)) = (low.parse::<u32>(), high.parse::<u32>()) {
                if low > 0 && high >= low {
                    return WordConstraint::Range { low, high };
                }
            }
        }

        let cleaned = raw.trim();
        if cleaned.is_empty() {
            return WordConstraint::default();
        }
        let lower = cleaned.to_lowercase();
        if lower.ends_with("word") || lower.ends_with("words") {
            WordConstraint::Verbatim(cleaned.to_string())
        } else {
            WordConstraint::Verbatim(format!("{cleaned} words."))
        }
    }
}

impl fmt::Display for WordConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordConstraint::Exact(words) => write!(f, "{words} words."),
            WordConstraint::Range { low, high } => write!(f, "{low}-{high} words."),
            WordConstraint::Verbatim(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryOptions {
    pub chunking: ChunkSettings,
    pub completion: CompletionOptions,
    pub word_constraint: WordConstraint,
}

/// Result of summarizing one paper.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperSummary {
    pub paper_id: String,
    pub metadata: PaperMetadata,
    pub chunk_count: usize,
    pub summary_text: String,
}

pub struct SummarizationEngine<C> {
    client: C,
    options: SummaryOptions,
}

impl<C: Completer> SummarizationEngine<C> {
    pub fn new(client: C, options: SummaryOptions) -> Self {
        Self { client, options }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Summarizes every chunk in order, then combines them. Text that yields
    /// no chunks returns an empty summary without calls or events. The first
    /// completion error ends the paper.
    pub fn summarize_single_paper(
        &mut self,
        text: &str,
        metadata: &PaperMetadata,
        observer: &mut dyn ProgressObserver,
    ) -> Result<PaperSummary, CompletionError> {
        let title = metadata.display_title().to_string();
        let chunks: Vec<&str> = chunk_text(text, self.options.chunking).collect();
        let total = chunks.len();
        let mut summary = PaperSummary {
            paper_id: metadata.paper_id.clone(),
            metadata: metadata.clone(),
            chunk_count: total,
            summary_text: String::new(),
        };
        if chunks.is_empty() {
            return Ok(summary);
        }

        let mut tracker = Tracker {
            paper_id: &metadata.paper_id,
            title: &title,
            snapshot: PaperSnapshot {
                stage: PaperStage::Summarizing,
                chunks_done: 0,
                chunks_total: total,
            },
        };
        notify(observer, &tracker.event(ProgressKind::ChunkingDone { chunk_count: total }));

        let mut chunk_summaries = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            let prompt = chunk_prompt(&title, &self.options.word_constraint, i + 1, total, chunk);
            let content = self.client.chat_complete(
                &[Message::system(RESEARCH_ASSISTANT), Message::user(prompt)],
                &self.options.completion,
            )?;
            chunk_summaries.push(content);

            tracker.snapshot.chunks_done = i + 1;
            let event = tracker.event(ProgressKind::ChunkSummarized {
                index: i + 1,
                total,
            });
            notify(observer, &event);
        }

        tracker.snapshot.stage = PaperStage::Combining;
        notify(observer, &tracker.event(ProgressKind::Combining));
        let combined = self.client.chat_complete(
            &[
                Message::system(RESEARCH_ASSISTANT),
                Message::user(combine_prompt(&title, &chunk_summaries)),
            ],
            &self.options.completion,
        )?;
        summary.summary_text = combined.trim().to_string();

        tracker.snapshot.stage = PaperStage::Done;
        notify(observer, &tracker.event(ProgressKind::PaperDone));
        Ok(summary)
    }

    /// One completion over all paper summaries. An empty corpus has nothing
    /// to synthesize and returns an empty string without a call.
    pub fn synthesize_corpus_summary(
        &mut self,
        papers: &[PaperReport],
    ) -> Result<String, CompletionError> {
        if papers.is_empty() {
            debug!("no papers to synthesize");
            return Ok(String::new());
        }
        let response = self.client.chat_complete(
            &[
                Message::system(SYNTHESIZER),
                Message::user(corpus_prompt(papers)),
            ],
            &self.options.completion,
        )?;
        Ok(response.trim().to_string())
    }
}

struct Tracker<'a> {
    paper_id: &'a str,
    title: &'a str,
    snapshot: PaperSnapshot,
}

impl Tracker<'_> {
    fn event(&self, kind: ProgressKind) -> ProgressEvent {
        ProgressEvent {
            paper_id: self.paper_id.to_string(),
            title: self.title.to_string(),
            kind,
            snapshot: self.snapshot,
        }
    }
}

fn notify(observer: &mut dyn ProgressObserver, event: &ProgressEvent) {
    if let Err(err) = observer.on_progress(event) {
        debug!(paper_id = %event.paper_id, error = %err, "progress observer failed");
    }
}

fn chunk_prompt(
    title: &str,
    words: &WordConstraint,
    index: usize,
    total: usize,
    chunk: &str,
) -> String {
    format!(
        "You are analyzing a research paper titled: {title}.\n\
Summarize the following excerpt focusing on: problem, method, data, key results, and limitations.\n\
Use concise academic tone. {words}\n\n\
Excerpt {index}/{total}:\n{chunk}"
    )
}

fn combine_prompt(title: &str, chunk_summaries: &[String]) -> String {
    let bullets: Vec<String> = chunk_summaries.iter().map(|s| format!("- {s}")).collect();
    format!(
        "Combine the following excerpt summaries into a cohesive summary of the paper.\n\
Structure the output with labeled sections: Problem, Method, Data, Results, Limitations.\n\
Keep it 250-350 words, objective, and specific.\n\n\
Title: {title}\n\n\
Excerpt summaries:\n{}",
        bullets.join("\n\n")
    )
}

fn corpus_prompt(papers: &[PaperReport]) -> String {
    let inputs: Vec<String> = papers
        .iter()
        .map(|p| format!("Title: {}\nSummary: {}", p.metadata.display_title(), p.summary))
        .collect();
    format!(
        "You are reviewing multiple research papers. Create a comprehensive synthesis including:\n\
- Field context and overarching themes\n\
- Key methods and trends\n\
- Consensus findings and points of disagreement\n\
- Notable gaps and future directions\n\
Write 350-500 words in clear, structured prose.\n\n\
Inputs:\n{}",
        inputs.join("\n\n")
    )
}

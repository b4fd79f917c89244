//! One full run: every PDF in listing order, then the corpus synthesis and
//! the report. A paper that fails never stops the papers after it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::llm::Completer;
use crate::pdf::{find_pdfs, Extractor};
use crate::progress::{Dashboard, RowProgress, StepStatus};
use crate::report::{write_report, PaperReport};
use crate::summarize::SummarizationEngine;

pub const PAPER_PLACEHOLDER: &str =
    "Summary generation failed (check that the completion server is running)";
pub const CORPUS_PLACEHOLDER: &str =
    "Corpus synthesis failed (check that the completion server is running)";

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// `None` when the report could not be written.
    pub report_path: Option<PathBuf>,
    pub papers: Vec<PaperReport>,
    pub corpus_summary: String,
    pub failed_extractions: usize,
    pub failed_summaries: usize,
}

/// Dashboard key: the raw file stem. Distinct files can share a slug.
fn paper_key(pdf: &Path) -> String {
    pdf.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn run<E, C>(
    config: &RunConfig,
    extractor: &E,
    engine: &mut SummarizationEngine<C>,
    dashboard: &mut Dashboard,
) -> Result<RunOutcome, PipelineError>
where
    E: Extractor,
    C: Completer,
{
    let pdfs = find_pdfs(&config.input_dir)?;
    if pdfs.is_empty() {
        return Err(PipelineError::NoPdfs {
            dir: config.input_dir.clone(),
        });
    }
    fs::create_dir_all(&config.artifacts_dir)?;
    info!(count = pdfs.len(), dir = %config.input_dir.display(), "found pdfs");

    for pdf in &pdfs {
        dashboard.register(&paper_key(pdf));
    }

    let mut papers = Vec::with_capacity(pdfs.len());
    let mut failed_extractions = 0usize;
    let mut failed_summaries = 0usize;
    for pdf in &pdfs {
        let key = paper_key(pdf);
        dashboard.set_extract(&key, StepStatus::InProgress);
        let paper = match extractor.extract(pdf, &config.artifacts_dir) {
            Ok(paper) => paper,
            Err(err) => {
                failed_extractions += 1;
                dashboard.set_extract(&key, StepStatus::Failed);
                warn!(pdf = %pdf.display(), error = %err, "extraction failed, skipping paper");
                continue;
            }
        };
        dashboard.set_title(&key, paper.metadata.display_title());
        dashboard.set_extract(&key, StepStatus::Done);

        let mut progress = RowProgress::new(dashboard, &key);
        let outcome = engine.summarize_single_paper(&paper.text, &paper.metadata, &mut progress);
        let summary = match outcome {
            Ok(summary) => {
                dashboard.finish_summary(&key);
                summary.summary_text
            }
            Err(err) => {
                failed_summaries += 1;
                dashboard.fail_summary(&key);
                warn!(pdf = %pdf.display(), error = %err, "summarization failed");
                PAPER_PLACEHOLDER.to_string()
            }
        };
        papers.push(PaperReport::new(
            paper.metadata,
            paper.text_path,
            paper.figures_paths,
            summary,
        ));
    }

    dashboard.set_report(StepStatus::InProgress);
    let corpus_summary = match engine.synthesize_corpus_summary(&papers) {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "corpus synthesis failed");
            CORPUS_PLACEHOLDER.to_string()
        }
    };

    let written = write_report(&config.report_dir, &corpus_summary, &papers, config.clusters);
    let report_path = match written {
        Ok(path) => {
            dashboard.set_report(StepStatus::Done);
            info!(path = %path.display(), "report written");
            Some(path)
        }
        Err(err) => {
            dashboard.set_report(StepStatus::Failed);
            error!(error = %err, "report generation failed");
            None
        }
    };

    Ok(RunOutcome {
        report_path,
        papers,
        corpus_summary,
        failed_extractions,
        failed_summaries,
    })
}

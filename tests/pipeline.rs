use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use paper_digest::pdf::{slugify, ExtractedPaper};
use paper_digest::pipeline::{self, CORPUS_PLACEHOLDER, PAPER_PLACEHOLDER};
use paper_digest::progress::StepStatus;
use paper_digest::report::REPORT_FILE;
use paper_digest::{
    ChunkSettings, Completer, CompletionError, CompletionOptions, Dashboard, ExtractError,
    Extractor, Message, PaperMetadata, PipelineError, RunConfig, SummarizationEngine,
    SummaryOptions,
};

/// Serves canned paper text keyed by file stem; unknown stems fail to load.
struct FakeExtractor {
    texts: HashMap<String, String>,
}

impl FakeExtractor {
    fn new(papers: &[(&str, String)]) -> Self {
        Self {
            texts: papers
                .iter()
                .map(|(stem, text)| (stem.to_string(), text.clone()))
                .collect(),
        }
    }
}

impl Extractor for FakeExtractor {
    fn extract(
        &self,
        pdf_path: &Path,
        artifacts_dir: &Path,
    ) -> Result<ExtractedPaper, ExtractError> {
        let stem = pdf_path.file_stem().unwrap().to_string_lossy().into_owned();
        let text = self.texts.get(&stem).cloned().ok_or_else(|| ExtractError::Load {
            path: pdf_path.to_path_buf(),
            message: "not a pdf".into(),
        })?;
        let paper_id = slugify(&stem);
        let mut metadata =
            PaperMetadata::new(paper_id.clone(), pdf_path.to_path_buf(), stem.clone());
        metadata.page_count = 3;
        Ok(ExtractedPaper {
            text_path: artifacts_dir.join(format!("clean_text/{paper_id}.txt")),
            metadata_path: artifacts_dir.join(format!("metadata/{paper_id}.json")),
            figures_paths: Vec::new(),
            paper_id,
            text,
            metadata,
        })
    }
}

/// Distinguishes chunk, combine and corpus calls by their prompts.
#[derive(Default)]
struct FakeLlm {
    calls: usize,
    chunk_calls: usize,
    fail_chunk: Option<(&'static str, usize)>,
    fail_corpus: bool,
}

impl Completer for FakeLlm {
    fn chat_complete(
        &mut self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        self.calls += 1;
        let prompt = &messages[1].content;
        let fail = || CompletionError::Status {
            url: "http://localhost:1234/v1/completions".into(),
            status: 503,
            body: "unavailable".into(),
        };
        if prompt.starts_with("You are reviewing multiple research papers") {
            if self.fail_corpus {
                return Err(fail());
            }
            return Ok("corpus overview".into());
        }
        if prompt.starts_with("Combine the following") {
            let title = prompt
                .lines()
                .find_map(|l| l.strip_prefix("Title: "))
                .unwrap_or_default();
            return Ok(format!("combined summary of {title}"));
        }
        self.chunk_calls += 1;
        if let Some((title, index)) = self.fail_chunk {
            let marker = format!("Excerpt {index}/");
            if prompt.contains(&format!("titled: {title}.")) && prompt.contains(&marker) {
                return Err(fail());
            }
        }
        Ok(format!("chunk note {}", self.chunk_calls))
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: RunConfig,
}

fn fixture(pdf_names: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("papers");
    fs::create_dir_all(&input).unwrap();
    for name in pdf_names {
        fs::write(input.join(name), b"%PDF-1.5").unwrap();
    }
    let mut config = RunConfig::new(&input);
    config.artifacts_dir = dir.path().join("artifacts");
    config.report_dir = dir.path().join("report");
    config.summary = SummaryOptions {
        chunking: ChunkSettings::new(100, 20).unwrap(),
        ..SummaryOptions::default()
    };
    Fixture { _dir: dir, config }
}

fn text(len: usize) -> String {
    "abcdefghij".chars().cycle().take(len).collect()
}

fn report_path(config: &RunConfig) -> PathBuf {
    config.report_dir.join(REPORT_FILE)
}

#[test]
fn two_papers_run_end_to_end() {
    let fx = fixture(&["alpha.pdf", "beta.PDF"]);
    let extractor = FakeExtractor::new(&[("alpha", text(250)), ("beta", text(250))]);
    let mut engine = SummarizationEngine::new(FakeLlm::default(), fx.config.summary.clone());
    let mut dashboard = Dashboard::new();

    let outcome = pipeline::run(&fx.config, &extractor, &mut engine, &mut dashboard).unwrap();

    // 3 chunks + 1 combine per paper, then one corpus call
    assert_eq!(engine.client().calls, 9);
    assert_eq!(engine.client().chunk_calls, 6);
    assert_eq!(outcome.papers.len(), 2);
    assert_eq!(outcome.papers[0].summary, "combined summary of alpha");
    assert_eq!(outcome.papers[1].summary, "combined summary of beta");
    assert_eq!(outcome.corpus_summary, "corpus overview");

    for row in dashboard.rows() {
        assert_eq!(row.extract, StepStatus::Done);
        assert_eq!(row.summarize, StepStatus::Done);
        assert_eq!(row.combine, StepStatus::Done);
        assert_eq!((row.chunks_done, row.chunks_total), (3, 3));
    }
    assert_eq!(dashboard.report_status(), StepStatus::Done);

    let path = outcome.report_path.unwrap();
    assert_eq!(path, report_path(&fx.config));
    let report = fs::read_to_string(path).unwrap();
    assert!(report.contains("corpus overview"));
    assert!(report.contains("### alpha (alpha)"));
    assert!(report.contains("### beta (beta)"));
    assert!(report.contains("| alpha | beta |"));
}

#[test]
fn failing_chunk_isolates_the_paper() {
    let fx = fixture(&["a-flaky.pdf", "b-steady.pdf"]);
    let extractor = FakeExtractor::new(&[("a-flaky", text(250)), ("b-steady", text(250))]);
    let llm = FakeLlm {
        fail_chunk: Some(("a-flaky", 2)),
        ..FakeLlm::default()
    };
    let mut engine = SummarizationEngine::new(llm, fx.config.summary.clone());
    let mut dashboard = Dashboard::new();

    let outcome = pipeline::run(&fx.config, &extractor, &mut engine, &mut dashboard).unwrap();

    assert_eq!(outcome.failed_summaries, 1);
    assert_eq!(outcome.papers[0].summary, PAPER_PLACEHOLDER);
    assert_eq!(outcome.papers[1].summary, "combined summary of b-steady");
    assert_eq!(dashboard.row("a-flaky").unwrap().summarize, StepStatus::Failed);
    assert_eq!(dashboard.row("b-steady").unwrap().summarize, StepStatus::Done);

    let report = fs::read_to_string(outcome.report_path.unwrap()).unwrap();
    assert!(report.contains(PAPER_PLACEHOLDER));
    assert!(!report.contains("chunk note"));
}

#[test]
fn extraction_failure_skips_the_paper() {
    let fx = fixture(&["broken.pdf", "good.pdf"]);
    let extractor = FakeExtractor::new(&[("good", text(90))]);
    let mut engine = SummarizationEngine::new(FakeLlm::default(), fx.config.summary.clone());
    let mut dashboard = Dashboard::new();

    let outcome = pipeline::run(&fx.config, &extractor, &mut engine, &mut dashboard).unwrap();

    assert_eq!(outcome.failed_extractions, 1);
    assert_eq!(outcome.papers.len(), 1);
    assert_eq!(outcome.papers[0].paper_id, "good");
    assert_eq!(dashboard.row("broken").unwrap().extract, StepStatus::Failed);
    // one chunk, one combine, one corpus call
    assert_eq!(engine.client().calls, 3);
}

#[test]
fn empty_paper_text_yields_empty_summary() {
    let fx = fixture(&["blank.pdf"]);
    let extractor = FakeExtractor::new(&[("blank", String::new())]);
    let mut engine = SummarizationEngine::new(FakeLlm::default(), fx.config.summary.clone());
    let mut dashboard = Dashboard::new();

    let outcome = pipeline::run(&fx.config, &extractor, &mut engine, &mut dashboard).unwrap();

    assert_eq!(outcome.papers[0].summary, "");
    let row = dashboard.row("blank").unwrap();
    assert_eq!(row.summarize, StepStatus::Done);
    assert_eq!(row.chunks_total, 0);
    // only the corpus synthesis reached the model
    assert_eq!(engine.client().calls, 1);
}

#[test]
fn corpus_failure_still_writes_the_report() {
    let fx = fixture(&["only.pdf"]);
    let extractor = FakeExtractor::new(&[("only", text(40))]);
    let llm = FakeLlm {
        fail_corpus: true,
        ..FakeLlm::default()
    };
    let mut engine = SummarizationEngine::new(llm, fx.config.summary.clone());
    let mut dashboard = Dashboard::new();

    let outcome = pipeline::run(&fx.config, &extractor, &mut engine, &mut dashboard).unwrap();

    assert_eq!(outcome.corpus_summary, CORPUS_PLACEHOLDER);
    let report = fs::read_to_string(outcome.report_path.unwrap()).unwrap();
    assert!(report.contains(CORPUS_PLACEHOLDER));
    assert!(report.contains("Single paper: similarity table skipped"));
}

#[test]
fn no_pdfs_is_a_clean_early_exit() {
    let fx = fixture(&[]);
    fs::write(fx.config.input_dir.join("notes.txt"), "not a paper").unwrap();
    let extractor = FakeExtractor::new(&[]);
    let mut engine = SummarizationEngine::new(FakeLlm::default(), fx.config.summary.clone());
    let mut dashboard = Dashboard::new();

    let err = pipeline::run(&fx.config, &extractor, &mut engine, &mut dashboard).unwrap_err();

    assert!(matches!(err, PipelineError::NoPdfs { .. }));
    assert_eq!(engine.client().calls, 0);
    assert!(!report_path(&fx.config).exists());
    assert!(dashboard.rows().is_empty());
}

#[test]
fn files_sharing_a_slug_keep_separate_rows() {
    let fx = fixture(&["A B.pdf", "a-b.pdf"]);
    let extractor = FakeExtractor::new(&[("A B", text(90)), ("a-b", text(250))]);
    let mut engine = SummarizationEngine::new(FakeLlm::default(), fx.config.summary.clone());
    let mut dashboard = Dashboard::new();

    let outcome = pipeline::run(&fx.config, &extractor, &mut engine, &mut dashboard).unwrap();

    assert_eq!(outcome.papers.len(), 2);
    assert_eq!(dashboard.rows().len(), 2);
    let spaced = dashboard.row("A B").unwrap();
    assert_eq!((spaced.chunks_done, spaced.chunks_total), (1, 1));
    assert_eq!(spaced.summarize, StepStatus::Done);
    let dashed = dashboard.row("a-b").unwrap();
    assert_eq!((dashed.chunks_done, dashed.chunks_total), (3, 3));
    assert_eq!(dashed.summarize, StepStatus::Done);
}

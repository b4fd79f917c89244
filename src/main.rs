use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use paper_digest::config::{self, RunConfig};
use paper_digest::chunk::{DEFAULT_MAX_CHARS, DEFAULT_OVERLAP};
use paper_digest::llm::{
    DEFAULT_API_KEY, DEFAULT_BASE_URL, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS,
};
use paper_digest::summarize::DEFAULT_CHUNK_SUMMARY_WORDS;
use paper_digest::pipeline;
use paper_digest::{
    ChunkSettings, CompletionClient, CompletionOptions, ContentAddressedCache, Dashboard,
    HttpTransport, PdfExtractor, PipelineError, SummarizationEngine, SummaryOptions,
    WordConstraint,
};

#[derive(Parser)]
#[command(
    name = "paper-digest",
    version,
    about = "Summarize a folder of research PDFs into one markdown report"
)]
struct Cli {
    #[arg(long)]
    input_dir: PathBuf,
    #[arg(long, default_value = "artifacts")]
    artifacts_dir: PathBuf,
    #[arg(long, default_value = "report")]
    report_dir: PathBuf,
    #[arg(long, default_value = config::DEFAULT_MODEL)]
    model: String,
    #[arg(long, env = "LMSTUDIO_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
    #[arg(long, env = "LMSTUDIO_API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
    api_key: String,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f64,
    #[arg(long, default_value_t = DEFAULT_MAX_CHARS)]
    max_chars: usize,
    #[arg(long, default_value_t = DEFAULT_OVERLAP)]
    chunk_overlap: usize,
    #[arg(long, default_value_t = config::DEFAULT_CLUSTERS)]
    clusters: usize,
    #[arg(long, default_value_t = config::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,
    #[arg(long, default_value = DEFAULT_CHUNK_SUMMARY_WORDS)]
    chunk_summary_words: String,
    #[arg(long)]
    instruction_file: Option<PathBuf>,
    #[arg(long)]
    no_cache: bool,
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        if self.max_chars < 1 {
            bail!("--max-chars must be >= 1");
        }
        if self.clusters < 1 {
            bail!("--clusters must be >= 1");
        }
        if self.timeout_secs < 1 {
            bail!("--timeout-secs must be >= 1");
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            bail!("--temperature must be between 0 and 2");
        }
        let chunking = ChunkSettings::new(self.max_chars, self.chunk_overlap)
            .context("invalid chunk settings (lower --chunk-overlap or raise --max-chars)")?;

        Ok(RunConfig {
            input_dir: self.input_dir,
            artifacts_dir: self.artifacts_dir,
            report_dir: self.report_dir,
            model: self.model,
            base_url: self.base_url,
            api_key: self.api_key,
            timeout: Duration::from_secs(self.timeout_secs),
            summary: SummaryOptions {
                chunking,
                completion: CompletionOptions {
                    temperature: self.temperature,
                    max_tokens: Some(self.max_tokens),
                },
                word_constraint: WordConstraint::parse(&self.chunk_summary_words),
            },
            clusters: self.clusters,
            use_cache: !self.no_cache,
            instruction_file: self.instruction_file,
        })
    }
}

fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.into_config()?;

    let cwd = std::env::current_dir().context("resolve working directory")?;
    let standing = config::load_standing_instructions(config.instruction_file.as_deref(), &cwd);
    let transport =
        HttpTransport::new(config.api_key.clone(), config.timeout).context("build http client")?;
    let mut client = CompletionClient::new(config.model.clone(), config.base_url.clone(), transport)
        .with_standing_instructions(standing);
    if config.use_cache {
        let cache_dir = config.cache_dir();
        let cache = ContentAddressedCache::open(&cache_dir)
            .with_context(|| format!("open cache {}", cache_dir.display()))?;
        client = client.with_cache(cache);
    }
    info!(model = client.model(), base_url = %config.base_url, "completion client ready");
    let mut engine = SummarizationEngine::new(client, config.summary.clone());
    let mut dashboard = Dashboard::new();

    let outcome = match pipeline::run(&config, &PdfExtractor, &mut engine, &mut dashboard) {
        Ok(outcome) => outcome,
        Err(PipelineError::NoPdfs { dir }) => {
            error!(dir = %dir.display(), "no PDF files found");
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err).context("run pipeline"),
    };

    eprint!("{dashboard}");
    info!(
        papers = outcome.papers.len(),
        failed_extractions = outcome.failed_extractions,
        failed_summaries = outcome.failed_summaries,
        "done"
    );
    match outcome.report_path {
        Some(path) => {
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::FAILURE),
    }
}

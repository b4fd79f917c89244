use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::llm::{
    CompletionOptions, Message, StandingInstructions, DEFAULT_API_KEY, DEFAULT_BASE_URL,
    DEFAULT_TIMEOUT_SECS,
};
use crate::summarize::SummaryOptions;

pub const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";
pub const DEFAULT_CLUSTERS: usize = 3;
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const INSTRUCTION_FILE: &str = "instruction.md";

/// Validated settings for one run. `new` gives the command line defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub report_dir: PathBuf,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub summary: SummaryOptions,
    pub clusters: usize,
    pub use_cache: bool,
    pub instruction_file: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            artifacts_dir: PathBuf::from("artifacts"),
            report_dir: PathBuf::from("report"),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            summary: SummaryOptions {
                completion: CompletionOptions {
                    max_tokens: Some(DEFAULT_MAX_TOKENS),
                    ..CompletionOptions::default()
                },
                ..SummaryOptions::default()
            },
            clusters: DEFAULT_CLUSTERS,
            use_cache: true,
            instruction_file: None,
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.artifacts_dir.join("cache")
    }
}

/// Reads the standing instruction file: `explicit` when given, otherwise
/// `instruction.md` in `cwd` if present. Missing, unreadable or blank files
/// give no instructions.
pub fn load_standing_instructions(explicit: Option<&Path>, cwd: &Path) -> StandingInstructions {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = cwd.join(INSTRUCTION_FILE);
            if !default.is_file() {
                return StandingInstructions::default();
            }
            default
        }
    };
    if !path.is_file() {
        warn!(path = %path.display(), "instruction file not found, continuing without it");
        return StandingInstructions::default();
    }
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let text = raw.trim();
            if text.is_empty() {
                return StandingInstructions::default();
            }
            info!(path = %path.display(), "applying standing instructions");
            StandingInstructions::new(vec![Message::system(text)])
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read instruction file");
            StandingInstructions::default()
        }
    }
}

//! Error types for the digest pipeline.
//!
//! One enum per failure domain. Cache corruption and observer failures have no
//! variant: both are absorbed where they happen.

use std::path::PathBuf;

/// Errors from a single completion request.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("unexpected response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CompletionError {
    /// True when the server answered but refused the request, which is the
    /// only failure that warrants switching protocols.
    pub fn is_rejection(&self) -> bool {
        matches!(self, CompletionError::Status { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk size must be at least 1 character")]
    ZeroWidth,

    #[error("chunk overlap {overlap} must be smaller than chunk size {max_chars}")]
    OverlapTooLarge { max_chars: usize, overlap: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("load pdf {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no PDF files found in {dir}")]
    NoPdfs { dir: PathBuf },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

//! Turns a folder of research PDFs into one markdown digest: per-paper
//! map-reduce summaries, a corpus-level synthesis and a similarity analysis.

pub mod cache;
pub mod chunk;
pub mod config;
pub mod error;
pub mod llm;
pub mod pdf;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod similarity;
pub mod summarize;

pub use cache::ContentAddressedCache;
pub use chunk::{chunk_text, ChunkSettings};
pub use config::RunConfig;
pub use error::{ChunkError, CompletionError, ExtractError, PipelineError};
pub use llm::{
    Completer, CompletionClient, CompletionOptions, HttpTransport, Message, Role,
    StandingInstructions,
};
pub use pdf::{Extractor, PaperMetadata, PdfExtractor};
pub use progress::{Dashboard, ProgressEvent, ProgressObserver, RowProgress};
pub use report::PaperReport;
pub use summarize::{PaperSummary, SummarizationEngine, SummaryOptions, WordConstraint};

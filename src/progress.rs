//! Progress reporting between the summarizer and whatever displays it.

use std::fmt;

use tracing::info;

/// Where a paper currently is in its summarization. Failure has no stage:
/// a failed paper emits no further events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperStage {
    Summarizing,
    Combining,
    Done,
}

/// Read-only view of a paper's progress at the moment an event fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaperSnapshot {
    pub stage: PaperStage,
    pub chunks_done: usize,
    pub chunks_total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    ChunkingDone { chunk_count: usize },
    /// `index` is 1-based.
    ChunkSummarized { index: usize, total: usize },
    Combining,
    PaperDone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub paper_id: String,
    pub title: String,
    pub kind: ProgressKind,
    pub snapshot: PaperSnapshot,
}

/// Receives progress events. A returned error is discarded by the caller and
/// never changes what the pipeline does next.
pub trait ProgressObserver {
    fn on_progress(&mut self, event: &ProgressEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl StepStatus {
    fn icon(self) -> &'static str {
        match self {
            StepStatus::Pending => "[ ]",
            StepStatus::InProgress => "[~]",
            StepStatus::Done => "[x]",
            StepStatus::Failed => "[!]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardRow {
    /// The PDF's file stem, unique per listed file.
    pub key: String,
    pub title: String,
    pub extract: StepStatus,
    pub summarize: StepStatus,
    pub combine: StepStatus,
    pub chunks_done: usize,
    pub chunks_total: usize,
}

/// Per-paper task board for a run, in listing order.
#[derive(Debug, Clone)]
pub struct Dashboard {
    rows: Vec<DashboardRow>,
    report: StepStatus,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            report: StepStatus::Pending,
        }
    }

    pub fn register(&mut self, key: &str) {
        if self.row(key).is_some() {
            return;
        }
        self.rows.push(DashboardRow {
            key: key.to_string(),
            title: key.to_string(),
            extract: StepStatus::Pending,
            summarize: StepStatus::Pending,
            combine: StepStatus::Pending,
            chunks_done: 0,
            chunks_total: 0,
        });
    }

    pub fn rows(&self) -> &[DashboardRow] {
        &self.rows
    }

    pub fn row(&self, key: &str) -> Option<&DashboardRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    fn row_mut(&mut self, key: &str) -> Option<&mut DashboardRow> {
        self.rows.iter_mut().find(|r| r.key == key)
    }

    pub fn report_status(&self) -> StepStatus {
        self.report
    }

    pub fn set_report(&mut self, status: StepStatus) {
        self.report = status;
    }

    pub fn set_title(&mut self, key: &str, title: &str) {
        if let Some(row) = self.row_mut(key) {
            row.title = title.to_string();
        }
    }

    pub fn set_extract(&mut self, key: &str, status: StepStatus) {
        if let Some(row) = self.row_mut(key) {
            row.extract = status;
        }
    }

    /// Marks the summary as finished for papers whose text produced no
    /// events at all.
    pub fn finish_summary(&mut self, key: &str) {
        if let Some(row) = self.row_mut(key) {
            if row.summarize == StepStatus::Pending {
                row.summarize = StepStatus::Done;
            }
            if row.combine == StepStatus::Pending {
                row.combine = StepStatus::Done;
            }
        }
    }

    pub fn fail_summary(&mut self, key: &str) {
        if let Some(row) = self.row_mut(key) {
            row.summarize = StepStatus::Failed;
            if row.combine == StepStatus::InProgress {
                row.combine = StepStatus::Failed;
            }
        }
    }

    /// Applies a progress event to the row registered under `key`.
    pub fn apply(&mut self, key: &str, event: &ProgressEvent) -> anyhow::Result<()> {
        let row = self
            .row_mut(key)
            .ok_or_else(|| anyhow::anyhow!("unknown paper {key}"))?;
        match event.kind {
            ProgressKind::ChunkingDone { chunk_count } => {
                row.summarize = StepStatus::InProgress;
                row.chunks_total = chunk_count;
                row.chunks_done = 0;
                info!(paper_id = %event.paper_id, chunks = chunk_count, "chunked");
            }
            ProgressKind::ChunkSummarized { index, total } => {
                row.chunks_done = event.snapshot.chunks_done.min(row.chunks_total);
                info!(paper_id = %event.paper_id, "summarized chunk {}/{}", index, total);
            }
            ProgressKind::Combining => {
                row.combine = StepStatus::InProgress;
                info!(paper_id = %event.paper_id, "combining chunk summaries");
            }
            ProgressKind::PaperDone => {
                row.summarize = StepStatus::Done;
                row.combine = StepStatus::Done;
                info!(paper_id = %event.paper_id, title = %event.title, "paper summarized");
            }
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let width = self
            .rows
            .iter()
            .map(|r| r.title.chars().count())
            .max()
            .unwrap_or(0)
            .max("Paper".len());
        let mut out = format!(
            "{:<width$}  Extract  Summarize  Combine  Chunks\n",
            "Paper",
            width = width
        );
        for row in &self.rows {
            let chunks = if row.chunks_total > 0 {
                format!("{}/{}", row.chunks_done, row.chunks_total)
            } else {
                "-".to_string()
            };
            out.push_str(&format!(
                "{:<width$}  {:<7}  {:<9}  {:<7}  {:>6}\n",
                row.title,
                row.extract.icon(),
                row.summarize.icon(),
                row.combine.icon(),
                chunks,
                width = width
            ));
        }
        out.push_str(&format!(
            "Report: {}  |  {} PDF(s)\n",
            self.report.icon(),
            self.rows.len()
        ));
        out
    }
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Rows are looked up by the event's paper id.
impl ProgressObserver for Dashboard {
    fn on_progress(&mut self, event: &ProgressEvent) -> anyhow::Result<()> {
        self.apply(&event.paper_id, event)
    }
}

/// Sends one paper's events to a fixed dashboard row, whatever its paper id.
pub struct RowProgress<'a> {
    dashboard: &'a mut Dashboard,
    key: &'a str,
}

impl<'a> RowProgress<'a> {
    pub fn new(dashboard: &'a mut Dashboard, key: &'a str) -> Self {
        Self { dashboard, key }
    }
}

impl ProgressObserver for RowProgress<'_> {
    fn on_progress(&mut self, event: &ProgressEvent) -> anyhow::Result<()> {
        self.dashboard.apply(self.key, event)
    }
}

//! Public and internal types for the enricher API and pipeline.

use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::config::PipelineDefaults;

/// One record read from an input file, ready for the enrichment operation.
///
/// Identity is `(dataset_label, file_id, item_id)`. Array files use the stringified index as `item_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkItem {
    pub dataset_label: String,
    pub file_id: String,
    pub item_id: String,
    pub payload: Value,
}

impl WorkItem {
    /// Key under which the item's id is recorded in [`ProcessingState::processed_items`](crate::checkpoint::ProcessingState).
    pub fn state_key(&self) -> String {
        item_key(&self.dataset_label, &self.file_id)
    }
}

/// `"{dataset_label}:{file_id}"`, the per-file key used by the checkpoint.
pub fn item_key(dataset_label: &str, file_id: &str) -> String {
    format!("{dataset_label}:{file_id}")
}

/// What travels through the work queue. `Shutdown` stops exactly one consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkSignal {
    Item(WorkItem),
    Shutdown,
}

/// Context handed to the enrichment operation alongside the payload, for logging and routing.
#[derive(Clone, Debug)]
pub struct ItemContext {
    pub dataset_label: String,
    pub file_id: String,
    pub item_id: String,
    /// Index of the consumer thread running the call.
    pub worker_id: usize,
}

impl ItemContext {
    pub(crate) fn for_item(item: &WorkItem, worker_id: usize) -> Self {
        Self {
            dataset_label: item.dataset_label.clone(),
            file_id: item.file_id.clone(),
            item_id: item.item_id.clone(),
            worker_id,
        }
    }
}

/// An item whose enrichment failed during this run. It stays unmarked and is retried next run.
#[derive(Clone, Debug)]
pub struct FailedItem {
    pub dataset_label: String,
    pub file_id: String,
    pub item_id: String,
    pub error: String,
}

/// An input file that could not be read or parsed. It is not marked processed.
#[derive(Clone, Debug)]
pub struct SkippedFile {
    pub file_id: String,
    pub reason: String,
}

/// How the producer finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No unprocessed files were found; nothing was enqueued.
    NothingToDo,
    /// Every candidate file was scanned (bad files skipped).
    Completed,
    /// Cancellation was requested before the scan finished.
    Cancelled,
}

/// Lifecycle of a [`PipelineRunner`](crate::pipeline::PipelineRunner).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    /// Producer active.
    Scanning,
    /// Producer done, consumers finishing the backlog.
    Draining,
    Terminated,
}

/// Outbound-call limits for one stage: optional rate window and optional in-flight cap.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageLimits {
    /// `(permits, period)`: at most `permits` calls per `period`.
    pub rate: Option<(u32, Duration)>,
    /// Max simultaneous `process` calls, independent of the consumer count.
    pub max_concurrent_sessions: Option<usize>,
}

/// Options for one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineOpts {
    /// Work queue capacity.
    pub queue_size: usize,
    /// Save a checkpoint every this many successful items.
    pub checkpoint_interval: u64,
    /// Number of consumer threads.
    pub max_concurrent_requests: usize,
    /// Directory holding `<label>.checkpoint.json` files.
    pub checkpoint_dir: PathBuf,
    /// Load the last checkpoint. When false the run starts from an empty state.
    pub resume: bool,
    /// Show a progress counter (CLI).
    pub verbose: bool,
    pub limits: StageLimits,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            queue_size: PipelineDefaults::QUEUE_SIZE,
            checkpoint_interval: PipelineDefaults::CHECKPOINT_INTERVAL,
            max_concurrent_requests: PipelineDefaults::MAX_CONCURRENT_REQUESTS,
            checkpoint_dir: PathBuf::from(PipelineDefaults::CHECKPOINT_DIR),
            resume: true,
            verbose: false,
            limits: StageLimits::default(),
        }
    }
}

impl PipelineOpts {
    /// Reject settings with which no safe run is possible.
    pub fn validate(&self) -> crate::Result<()> {
        if self.queue_size == 0 {
            anyhow::bail!("queue_size must be greater than 0");
        }
        if self.checkpoint_interval == 0 {
            anyhow::bail!("checkpoint_interval must be greater than 0");
        }
        if self.max_concurrent_requests == 0 {
            anyhow::bail!("max_concurrent_requests must be greater than 0");
        }
        if let Some((permits, period)) = self.limits.rate
            && (permits == 0 || period.is_zero())
        {
            anyhow::bail!("rate limit needs permits > 0 and a non-zero period");
        }
        if self.limits.max_concurrent_sessions == Some(0) {
            anyhow::bail!("max_concurrent_sessions must be greater than 0");
        }
        Ok(())
    }
}

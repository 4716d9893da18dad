//! Pipeline context: shared run state handed to the producer thread and every consumer.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::checkpoint::{CheckpointStore, SharedState};
use crate::{FailedItem, SkippedFile};

/// Called after each successful item with the new `total_processed`.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Everything one run shares across threads. Cheap to clone; all fields are shared handles.
#[derive(Clone)]
pub struct PipelineContext {
    pub dataset_label: String,
    pub state: SharedState,
    pub store: Arc<CheckpointStore>,
    pub checkpoint_interval: u64,
    pub cancel: Arc<AtomicBool>,
    pub results: Arc<Mutex<Vec<Value>>>,
    pub failed: Arc<Mutex<Vec<FailedItem>>>,
    pub skipped_files: Arc<Mutex<Vec<SkippedFile>>>,
    pub on_success: Option<ProgressFn>,
}

impl PipelineContext {
    pub fn new(
        dataset_label: &str,
        state: SharedState,
        store: Arc<CheckpointStore>,
        checkpoint_interval: u64,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            dataset_label: dataset_label.to_string(),
            state,
            store,
            checkpoint_interval,
            cancel,
            results: Arc::new(Mutex::new(Vec::new())),
            failed: Arc::new(Mutex::new(Vec::new())),
            skipped_files: Arc::new(Mutex::new(Vec::new())),
            on_success: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn push_result(&self, value: Value) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }

    pub fn push_failed(&self, failed: FailedItem) {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failed);
    }

    pub fn push_skipped_file(&self, skipped: SkippedFile) {
        self.skipped_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(skipped);
    }

    /// Save the current state; an I/O failure is logged and the run continues in memory.
    pub fn save_checkpoint(&self) {
        if let Err(e) = self.store.save_shared(&self.dataset_label, &self.state) {
            log::error!("{e:#}; continuing with in-memory state");
        }
    }
}

/// Move the collected vectors out of the shared context (after all threads are joined).
pub(crate) fn take_shared<T>(shared: &Arc<Mutex<Vec<T>>>) -> Vec<T> {
    std::mem::take(&mut *shared.lock().unwrap_or_else(PoisonError::into_inner))
}

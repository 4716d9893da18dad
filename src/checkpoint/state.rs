use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Durable progress of one dataset.
///
/// - `processed_files`: files fully scanned whose every item was processed successfully.
/// - `current_file`: file being scanned when the checkpoint was taken; rescanned first on resume.
/// - `processed_items`: `"{dataset_label}:{file_id}"` → ids that were processed successfully.
/// - `total_processed`: successful items across runs; gates periodic saves.
///
/// Sets are ordered so the checkpoint file is stable and diffable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingState {
    pub processed_files: BTreeSet<String>,
    pub current_file: Option<String>,
    pub processed_items: BTreeMap<String, BTreeSet<String>>,
    pub total_processed: u64,
}

impl ProcessingState {
    pub fn is_item_processed(&self, key: &str, item_id: &str) -> bool {
        self.processed_items
            .get(key)
            .is_some_and(|ids| ids.contains(item_id))
    }

    /// Number of item ids recorded across all files.
    pub fn recorded_items(&self) -> usize {
        self.processed_items.values().map(BTreeSet::len).sum()
    }
}

/// In-run bookkeeping for a file that is not marked yet. Never persisted.
#[derive(Debug, Default)]
struct FileProgress {
    /// Enqueued items not yet settled by a consumer.
    pending: usize,
    scan_finished: bool,
    /// Some item failed or produced no result in this run.
    incomplete: bool,
}

#[derive(Debug, Default)]
struct Inner {
    state: ProcessingState,
    files: HashMap<String, FileProgress>,
}

impl Inner {
    /// Move `file_id` into `processed_files` once its scan finished and every enqueued item
    /// succeeded. Returns true when the file was marked.
    fn try_mark(&mut self, file_id: &str) -> bool {
        let done = self
            .files
            .get(file_id)
            .is_some_and(|p| p.scan_finished && p.pending == 0 && !p.incomplete);
        if done {
            self.files.remove(file_id);
            self.state.processed_files.insert(file_id.to_string());
        }
        done
    }
}

/// The one shared, mutable [`ProcessingState`] of a run. All reads and writes go through one lock,
/// so a [`snapshot`](Self::snapshot) is always consistent.
///
/// A file reaches `processed_files` only after its scan finished and all of its enqueued items
/// were recorded, so a checkpoint taken while items are queued or in flight never hides them.
#[derive(Clone, Debug, Default)]
pub struct SharedState {
    inner: Arc<Mutex<Inner>>,
}

impl SharedState {
    pub fn new(state: ProcessingState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                files: HashMap::new(),
            })),
        }
    }

    // A panic while holding the lock cannot leave the state half-updated (every update is a
    // single insert or counter change), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer: mark `file_id` as the file being scanned and make sure its item set exists.
    pub fn begin_file(&self, file_id: &str, key: &str) {
        let mut inner = self.lock();
        inner.state.current_file = Some(file_id.to_string());
        inner.state.processed_items.entry(key.to_string()).or_default();
        inner.files.insert(file_id.to_string(), FileProgress::default());
    }

    /// Producer: count an item of `file_id` as outstanding. Call before handing it to the queue.
    pub fn item_enqueued(&self, file_id: &str) {
        if let Some(p) = self.lock().files.get_mut(file_id) {
            p.pending += 1;
        }
    }

    /// Producer: every item of `file_id` has been enqueued. Returns true when the file was
    /// marked processed right away (nothing left in flight).
    pub fn finish_file(&self, file_id: &str) -> bool {
        let mut inner = self.lock();
        if let Some(p) = inner.files.get_mut(file_id) {
            p.scan_finished = true;
        }
        inner.try_mark(file_id)
    }

    /// Consumer: an item of `file_id` is done, successfully or not. Returns true when this
    /// completed the file. Items from files the state does not track are ignored.
    pub fn settle_item(&self, file_id: &str, succeeded: bool) -> bool {
        let mut inner = self.lock();
        let Some(p) = inner.files.get_mut(file_id) else {
            return false;
        };
        p.pending = p.pending.saturating_sub(1);
        if !succeeded {
            p.incomplete = true;
        }
        inner.try_mark(file_id)
    }

    pub fn is_item_processed(&self, key: &str, item_id: &str) -> bool {
        self.lock().state.is_item_processed(key, item_id)
    }

    /// Consumer: record a successful item. Returns the new `total_processed`.
    /// Recording an id that is already present leaves the counter unchanged.
    pub fn record_success(&self, key: &str, item_id: &str) -> u64 {
        let mut inner = self.lock();
        let state = &mut inner.state;
        let inserted = state
            .processed_items
            .entry(key.to_string())
            .or_default()
            .insert(item_id.to_string());
        if inserted {
            state.total_processed += 1;
        }
        state.total_processed
    }

    pub fn processed_files(&self) -> BTreeSet<String> {
        self.lock().state.processed_files.clone()
    }

    pub fn current_file(&self) -> Option<String> {
        self.lock().state.current_file.clone()
    }

    pub fn snapshot(&self) -> ProcessingState {
        self.lock().state.clone()
    }
}

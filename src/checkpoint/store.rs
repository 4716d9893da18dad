use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::state::{ProcessingState, SharedState};
use crate::utils::config::CHECKPOINT_SUFFIX;
use crate::utils::tempfiles::{temp_path_for, write_atomic};

/// Durable checkpoints, one JSON file per dataset label under a directory.
///
/// Writes go to `<file>.tmp` and are renamed over the checkpoint, so readers only ever see a
/// complete file. Saves are serialized by an internal lock.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    save_lock: Mutex<()>,
}

impl CheckpointStore {
    /// Open (creating if needed) the checkpoint directory. Failure here is fatal for the run.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create checkpoint directory {}", dir.display()))?;
        Ok(Self {
            dir,
            save_lock: Mutex::new(()),
        })
    }

    /// Store rooted at `dir` without touching the filesystem. For read-only queries such as
    /// `--status`; a missing directory just means no checkpoints.
    pub fn at(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            save_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<label>.checkpoint.json`. Path separators in the label are replaced.
    pub fn path_for(&self, dataset_label: &str) -> PathBuf {
        let safe: String = dataset_label
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        self.dir.join(format!("{safe}{CHECKPOINT_SUFFIX}"))
    }

    /// Load the last checkpoint for `dataset_label`. Missing or corrupt checkpoints yield an empty
    /// state; they never abort the run.
    pub fn load(&self, dataset_label: &str) -> ProcessingState {
        let path = self.path_for(dataset_label);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("{dataset_label}: no checkpoint at {}, starting fresh", path.display());
                return ProcessingState::default();
            }
            Err(e) => {
                warn!("{dataset_label}: cannot read checkpoint {}: {e}; starting fresh", path.display());
                return ProcessingState::default();
            }
        };
        match serde_json::from_str::<ProcessingState>(&raw) {
            Ok(state) => {
                info!(
                    "{dataset_label}: resuming from checkpoint ({} files done, {} items recorded, {} total)",
                    state.processed_files.len(),
                    state.recorded_items(),
                    state.total_processed
                );
                state
            }
            Err(e) => {
                warn!("{dataset_label}: corrupt checkpoint {}: {e}; starting fresh", path.display());
                ProcessingState::default()
            }
        }
    }

    /// Write `state` atomically.
    pub fn save(&self, dataset_label: &str, state: &ProcessingState) -> Result<()> {
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(dataset_label, state)
    }

    /// Snapshot `shared` under the save lock and write it. Concurrent callers can't write an older
    /// snapshot after a newer one.
    pub fn save_shared(&self, dataset_label: &str, shared: &SharedState) -> Result<()> {
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(dataset_label, &shared.snapshot())
    }

    fn write(&self, dataset_label: &str, state: &ProcessingState) -> Result<()> {
        let path = self.path_for(dataset_label);
        let bytes = serde_json::to_vec_pretty(state).context("serialize checkpoint")?;
        write_atomic(&path, &bytes)
            .with_context(|| format!("{dataset_label}: save checkpoint {}", path.display()))?;
        debug!(
            "{dataset_label}: checkpoint saved ({} total processed)",
            state.total_processed
        );
        Ok(())
    }

    /// Delete the checkpoint (and any stale temp file). Returns whether a checkpoint existed.
    pub fn remove(&self, dataset_label: &str) -> Result<bool> {
        let path = self.path_for(dataset_label);
        let _ = std::fs::remove_file(temp_path_for(&path));
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove checkpoint {}", path.display())),
        }
    }
}

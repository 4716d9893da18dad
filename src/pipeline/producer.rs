//! Producer: list input files, load each one, and emit every unprocessed item into the work queue.

use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use walkdir::WalkDir;

use super::context::PipelineContext;
use super::queue::WorkQueue;
use crate::checkpoint::SharedState;
use crate::utils::config::INPUT_EXTENSION;
use crate::{ScanOutcome, SkippedFile, WorkItem, WorkSignal, item_key};

/// What the producer did in one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerReport {
    pub outcome: ScanOutcome,
    /// Files scanned to the end. Marking them processed waits for their items to succeed.
    pub files_completed: usize,
    pub enqueued: usize,
}

/// How far the scan of one file got.
enum FileScan {
    Done { enqueued: usize },
    Interrupted { enqueued: usize },
}

/// Candidate input files in `dir`, by name: `*.json`, not in `processed_files`, with the
/// checkpoint's `current_file` moved to the front. A missing directory is fatal.
pub fn scan_files(dir: &Path, state: &SharedState) -> Result<Vec<String>> {
    if !dir.is_dir() {
        bail!("input directory {} does not exist or is not a directory", dir.display());
    }
    let processed = state.processed_files();
    let mut files: Vec<String> = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("{}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(INPUT_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("skipping non UTF-8 file name {}", path.display());
            continue;
        };
        if !processed.contains(name) {
            files.push(name.to_string());
        }
    }
    if let Some(current) = state.current_file()
        && let Some(pos) = files.iter().position(|f| *f == current)
    {
        let current = files.remove(pos);
        debug!("resuming {current} first");
        files.insert(0, current);
    }
    Ok(files)
}

/// Items of one input file in file order: an object maps id → payload, an array is indexed by
/// position (the index, as a string, is the id). Any other top-level value is an error.
pub fn load_items(path: &Path) -> Result<Vec<(String, Value)>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let data: Value =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    match data {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect()),
        other => bail!(
            "{}: expected a JSON object or array at top level, found {}",
            path.display(),
            json_kind(&other)
        ),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Enqueue every item of `file_id` that the state hasn't recorded yet.
fn emit_file(
    ctx: &PipelineContext,
    path: &Path,
    file_id: &str,
    queue: &WorkQueue,
) -> Result<FileScan> {
    let items = load_items(path)?;
    let key = item_key(&ctx.dataset_label, file_id);
    ctx.state.begin_file(file_id, &key);

    let mut enqueued = 0_usize;
    for (item_id, payload) in items {
        if ctx.is_cancelled() {
            return Ok(FileScan::Interrupted { enqueued });
        }
        if ctx.state.is_item_processed(&key, &item_id) {
            continue;
        }
        let item = WorkItem {
            dataset_label: ctx.dataset_label.clone(),
            file_id: file_id.to_string(),
            item_id,
            payload,
        };
        ctx.state.item_enqueued(file_id);
        if queue.put(WorkSignal::Item(item)).is_err() {
            ctx.state.settle_item(file_id, false);
            return Ok(FileScan::Interrupted { enqueued });
        }
        enqueued += 1;
    }
    Ok(FileScan::Done { enqueued })
}

/// Scan `dir` and emit unprocessed items for `ctx.dataset_label`.
///
/// File-level failures are logged, recorded in `ctx.skipped_files`, and leave the file unmarked so
/// the next run retries it. Only an unusable input directory is returned as an error.
pub fn scan_and_emit(ctx: &PipelineContext, dir: &Path, queue: &WorkQueue) -> Result<ProducerReport> {
    let label = &ctx.dataset_label;
    let files = scan_files(dir, &ctx.state)?;
    if files.is_empty() {
        warn!("{label}: no new files to process in {}", dir.display());
        return Ok(ProducerReport {
            outcome: ScanOutcome::NothingToDo,
            files_completed: 0,
            enqueued: 0,
        });
    }
    info!("{label}: found {} files to process", files.len());

    let mut report = ProducerReport {
        outcome: ScanOutcome::Completed,
        files_completed: 0,
        enqueued: 0,
    };
    for file_id in files {
        if ctx.is_cancelled() {
            report.outcome = ScanOutcome::Cancelled;
            break;
        }
        let path = dir.join(&file_id);
        match emit_file(ctx, &path, &file_id, queue) {
            Ok(FileScan::Done { enqueued }) => {
                report.files_completed += 1;
                report.enqueued += enqueued;
                if ctx.state.finish_file(&file_id) {
                    info!("{label}: file {file_id} has nothing left to process");
                } else {
                    info!("{label}: file {file_id} fully enqueued ({enqueued} items)");
                }
            }
            Ok(FileScan::Interrupted { enqueued }) => {
                report.enqueued += enqueued;
                report.outcome = ScanOutcome::Cancelled;
                warn!("{label}: scan of {file_id} interrupted after {enqueued} items");
                break;
            }
            Err(e) => {
                error!("{label}: failed reading {file_id}: {e:#}");
                ctx.push_skipped_file(SkippedFile {
                    file_id,
                    reason: format!("{e:#}"),
                });
            }
        }
    }
    Ok(report)
}

/// Run [`scan_and_emit`] on its own thread.
pub fn spawn_producer(
    ctx: PipelineContext,
    dir: PathBuf,
    queue: WorkQueue,
) -> JoinHandle<Result<ProducerReport>> {
    thread::spawn(move || scan_and_emit(&ctx, &dir, &queue))
}

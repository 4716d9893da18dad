//! Pipeline runner: owns one run's lifecycle from checkpoint load to final save.

use anyhow::{Result, anyhow, bail};
use log::{debug, error, info};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::JoinHandle;

use super::consumer::spawn_consumers;
use super::context::{PipelineContext, ProgressFn, take_shared};
use super::producer::{ProducerReport, spawn_producer};
use super::queue::WorkQueue;
use crate::checkpoint::{CheckpointStore, ProcessingState, SharedState};
use crate::limiter::Limiters;
use crate::process::Processor;
use crate::{FailedItem, PipelineOpts, RunnerState, ScanOutcome, SkippedFile, WorkSignal};

/// What a finished run hands back to the caller.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Results of items processed in this run, in completion order.
    pub results: Vec<Value>,
    /// State as of the final checkpoint save.
    pub state: ProcessingState,
    pub scan: ScanOutcome,
    pub files_completed: usize,
    pub enqueued: usize,
    pub failed: Vec<FailedItem>,
    pub skipped_files: Vec<SkippedFile>,
}

impl PipelineOutcome {
    /// True when the producer found no unprocessed file.
    pub fn nothing_to_do(&self) -> bool {
        self.scan == ScanOutcome::NothingToDo
    }
}

/// Wires producer, queue and consumer pool for one dataset at a time.
///
/// `Idle → Scanning → Draining → Terminated`. Consumers are stopped by one `Shutdown` signal each,
/// never by killing threads, so no `process` call is abandoned mid-flight.
pub struct PipelineRunner {
    opts: PipelineOpts,
    store: Arc<CheckpointStore>,
    cancel: Arc<AtomicBool>,
    on_success: Option<ProgressFn>,
    state: RunnerState,
}

impl PipelineRunner {
    /// Validate `opts` and open the checkpoint directory. Both failures are fatal.
    pub fn new(opts: PipelineOpts) -> Result<Self> {
        let store = Arc::new(CheckpointStore::open(&opts.checkpoint_dir)?);
        Self::with_store(opts, store)
    }

    /// Like [`new`](Self::new) but sharing an already opened store.
    pub fn with_store(opts: PipelineOpts, store: Arc<CheckpointStore>) -> Result<Self> {
        opts.validate()?;
        Ok(Self {
            opts,
            store,
            cancel: Arc::new(AtomicBool::new(false)),
            on_success: None,
            state: RunnerState::Idle,
        })
    }

    /// Set to `true` to stop the producer early; queued items are still drained.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Use a shared cancellation flag (e.g. one flag for every stage of a CLI run).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called after every successful item with the new `total_processed`.
    pub fn on_success(mut self, f: ProgressFn) -> Self {
        self.on_success = Some(f);
        self
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.store
    }

    fn transition(&mut self, to: RunnerState, label: &str) {
        debug!("{label}: {:?} -> {:?}", self.state, to);
        self.state = to;
    }

    /// Process every unprocessed item of `dir` for `dataset_label` and return this run's results.
    pub fn run(
        &mut self,
        dataset_label: &str,
        dir: &Path,
        processor: Arc<dyn Processor>,
    ) -> Result<PipelineOutcome> {
        // Checked here so a bad directory aborts before any thread starts or checkpoint is written.
        if !dir.is_dir() {
            bail!(
                "{dataset_label}: input directory {} does not exist or is not a directory",
                dir.display()
            );
        }
        let initial = if self.opts.resume {
            self.store.load(dataset_label)
        } else {
            ProcessingState::default()
        };
        let mut ctx = PipelineContext::new(
            dataset_label,
            SharedState::new(initial),
            Arc::clone(&self.store),
            self.opts.checkpoint_interval,
            Arc::clone(&self.cancel),
        );
        ctx.on_success = self.on_success.clone();

        let queue = WorkQueue::new(self.opts.queue_size);
        let limiters = Limiters::from_limits(&self.opts.limits);
        let consumer_count = self.opts.max_concurrent_requests;

        self.transition(RunnerState::Scanning, dataset_label);
        let consumers = spawn_consumers(consumer_count, &queue, &ctx, &processor, &limiters);
        let producer = spawn_producer(ctx.clone(), dir.to_path_buf(), queue.clone());
        let report = join_producer(producer);

        self.transition(RunnerState::Draining, dataset_label);
        for _ in 0..consumer_count {
            // Cannot disconnect: `queue` holds its own receiver.
            let _ = queue.put(WorkSignal::Shutdown);
        }
        join_consumers(consumers, dataset_label);
        if queue.unfinished() > 0 {
            error!(
                "{dataset_label}: {} queue entries left unacknowledged",
                queue.unfinished()
            );
        }

        self.transition(RunnerState::Terminated, dataset_label);
        ctx.save_checkpoint();

        let report = report?;
        let outcome = PipelineOutcome {
            results: take_shared(&ctx.results),
            state: ctx.state.snapshot(),
            scan: report.outcome,
            files_completed: report.files_completed,
            enqueued: report.enqueued,
            failed: take_shared(&ctx.failed),
            skipped_files: take_shared(&ctx.skipped_files),
        };
        info!(
            "{dataset_label}: run finished ({} enqueued, {} processed, {} failed, {} files skipped)",
            outcome.enqueued,
            outcome.results.len(),
            outcome.failed.len(),
            outcome.skipped_files.len()
        );
        Ok(outcome)
    }
}

fn join_producer(handle: JoinHandle<Result<ProducerReport>>) -> Result<ProducerReport> {
    handle
        .join()
        .map_err(|_| anyhow!("producer thread panicked"))?
}

fn join_consumers(handles: Vec<JoinHandle<()>>, label: &str) {
    for (worker_id, h) in handles.into_iter().enumerate() {
        if h.join().is_err() {
            error!("{label}: worker-{worker_id} panicked");
        }
    }
}

//! Enricher: resumable, checkpointed, rate-limited streaming pipeline for record enrichment

pub mod checkpoint;
pub mod engine;
pub mod limiter;
pub mod pipeline;
pub mod process;
pub mod stage;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

use log::debug;
use std::path::Path;
use std::sync::Arc;

use crate::pipeline::{PipelineOutcome, PipelineRunner};
use crate::process::Processor;

/// Result alias used by public enricher API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: run `processor` over every unprocessed item in `dir` for `dataset_label`,
/// resuming from (and checkpointing to) `opts.checkpoint_dir`.
///
/// Returns this run's results only; items finished by earlier runs are skipped, not replayed.
/// Item and file failures are reported in the outcome; only setup errors (bad options, missing
/// directories) are returned as `Err`.
///
/// ```ignore
/// let opts = PipelineOpts { checkpoint_dir: "checkpoints".into(), ..Default::default() };
/// let outcome = enricher::run_dataset("companies", Path::new("data"), &opts, |_ctx: &ItemContext, v: &Value| {
///     Ok(Some(v.clone()))
/// })?;
/// ```
pub fn run_dataset<P>(
    dataset_label: &str,
    dir: &Path,
    opts: &PipelineOpts,
    processor: P,
) -> Result<PipelineOutcome>
where
    P: Processor + 'static,
{
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );
    let mut runner = PipelineRunner::new(opts.clone())?;
    runner.run(dataset_label, dir, Arc::new(processor))
}

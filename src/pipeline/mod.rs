//! Pipeline components: work queue, producer, consumer pool, runner.

pub mod consumer;
pub mod context;
pub mod error_handler;
pub mod producer;
pub mod queue;
pub mod runner;

pub use consumer::spawn_consumers;
pub use context::{PipelineContext, ProgressFn};
pub use error_handler::report_skipped_and_failed;
pub use producer::{ProducerReport, load_items, scan_and_emit, scan_files, spawn_producer};
pub use queue::WorkQueue;
pub use runner::{PipelineOutcome, PipelineRunner};

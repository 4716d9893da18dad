//! Consumer pool: drain the work queue, call the processor under the stage limits, record results.

use anyhow::anyhow;
use log::{debug, error, info};
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::context::PipelineContext;
use super::queue::WorkQueue;
use crate::limiter::Limiters;
use crate::process::Processor;
use crate::{FailedItem, ItemContext, WorkItem, WorkSignal};

/// Call the processor while holding the stage's permits. A panic becomes an item error.
fn process_item(
    processor: &dyn Processor,
    limiters: &Limiters,
    item: &WorkItem,
    worker_id: usize,
) -> anyhow::Result<Option<Value>> {
    let ctx = ItemContext::for_item(item, worker_id);
    let _permit = limiters.acquire();
    catch_unwind(AssertUnwindSafe(|| processor.process(&ctx, &item.payload)))
        .unwrap_or_else(|panic| {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow!("processor panicked: {msg}"))
        })
}

fn record_success(ctx: &PipelineContext, item: &WorkItem, result: Value) {
    let total = ctx.state.record_success(&item.state_key(), &item.item_id);
    if ctx.state.settle_item(&item.file_id, true) {
        debug!("[{}] file {} completed", item.dataset_label, item.file_id);
    }
    ctx.push_result(result);
    if let Some(on_success) = &ctx.on_success {
        on_success(total);
    }
    if ctx.checkpoint_interval > 0 && total % ctx.checkpoint_interval == 0 {
        ctx.save_checkpoint();
    }
}

/// Single consumer: loop until a `Shutdown` signal. Item failures are logged and recorded; they
/// never stop the worker.
fn consumer_loop(
    worker_id: usize,
    queue: WorkQueue,
    ctx: PipelineContext,
    processor: Arc<dyn Processor>,
    limiters: Limiters,
) {
    while let Some(signal) = queue.get() {
        let item = match signal {
            WorkSignal::Shutdown => {
                debug!("worker-{worker_id} received shutdown signal");
                queue.task_done();
                return;
            }
            WorkSignal::Item(item) => item,
        };
        match process_item(processor.as_ref(), &limiters, &item, worker_id) {
            Ok(Some(result)) if !result.is_null() => {
                debug!(
                    "[{}] processed item {} from {}",
                    item.dataset_label, item.item_id, item.file_id
                );
                record_success(&ctx, &item, result);
            }
            Ok(_) => {
                ctx.state.settle_item(&item.file_id, false);
                info!(
                    "[{}] item {} from {} produced no result; left for the next run",
                    item.dataset_label, item.item_id, item.file_id
                );
            }
            Err(e) => {
                ctx.state.settle_item(&item.file_id, false);
                error!(
                    "[{}] worker-{worker_id} failed item {} from {}: {e:#}",
                    item.dataset_label, item.item_id, item.file_id
                );
                ctx.push_failed(FailedItem {
                    dataset_label: item.dataset_label.clone(),
                    file_id: item.file_id.clone(),
                    item_id: item.item_id.clone(),
                    error: format!("{e:#}"),
                });
            }
        }
        queue.task_done();
    }
}

/// Spawn `count` consumers sharing one queue, processor and limiter set.
pub fn spawn_consumers(
    count: usize,
    queue: &WorkQueue,
    ctx: &PipelineContext,
    processor: &Arc<dyn Processor>,
    limiters: &Limiters,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let queue = queue.clone();
            let ctx = ctx.clone();
            let processor = Arc::clone(processor);
            let limiters = limiters.clone();
            thread::spawn(move || consumer_loop(worker_id, queue, ctx, processor, limiters))
        })
        .collect()
}

//! Work queue backpressure and termination, rate and session limiters.

use enricher::checkpoint::{CheckpointStore, SharedState};
use enricher::limiter::{ConcurrencyLimiter, Limiters, RateLimiter};
use enricher::pipeline::{PipelineContext, WorkQueue, spawn_consumers};
use enricher::process::Processor;
use enricher::{ItemContext, StageLimits, WorkItem, WorkSignal};
use serde_json::{Value, json};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

fn item(id: &str) -> WorkSignal {
    WorkSignal::Item(WorkItem {
        dataset_label: "ds".to_string(),
        file_id: "f.json".to_string(),
        item_id: id.to_string(),
        payload: json!({"id": id}),
    })
}

// --- WorkQueue ---

#[test]
fn test_put_blocks_until_queue_drains() {
    let queue = WorkQueue::new(1);
    queue.put(item("first")).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let producer_queue = queue.clone();
    let producer = thread::spawn(move || {
        producer_queue.put(item("second")).unwrap();
        done_tx.send(()).unwrap();
    });

    // Full queue: the second put must still be waiting.
    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(queue.len(), 1);

    assert_eq!(queue.get(), Some(item("first")));
    queue.task_done();
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    producer.join().unwrap();
    assert_eq!(queue.get(), Some(item("second")));
    queue.task_done();
    assert_eq!(queue.unfinished(), 0);
}

#[test]
fn test_queue_is_fifo() {
    let queue = WorkQueue::new(8);
    for id in ["a", "b", "c"] {
        queue.put(item(id)).unwrap();
    }
    for id in ["a", "b", "c"] {
        assert_eq!(queue.get(), Some(item(id)));
        queue.task_done();
    }
    assert!(queue.is_empty());
}

#[test]
fn test_join_waits_for_task_done() {
    let queue = WorkQueue::new(4);
    queue.put(item("a")).unwrap();
    queue.put(item("b")).unwrap();
    assert_eq!(queue.unfinished(), 2);

    let worker_queue = queue.clone();
    let worker = thread::spawn(move || {
        for _ in 0..2 {
            worker_queue.get().unwrap();
            thread::sleep(Duration::from_millis(20));
            worker_queue.task_done();
        }
    });
    queue.join();
    assert_eq!(queue.unfinished(), 0);
    worker.join().unwrap();
}

#[test]
fn test_zero_capacity_is_clamped() {
    assert_eq!(WorkQueue::new(0).capacity(), 1);
}

// --- consumer pool termination ---

fn test_context(dir: &std::path::Path) -> PipelineContext {
    let store = Arc::new(CheckpointStore::open(dir).unwrap());
    PipelineContext::new(
        "ds",
        SharedState::default(),
        store,
        100,
        Arc::new(AtomicBool::new(false)),
    )
}

#[test]
fn test_one_shutdown_per_consumer_terminates_pool() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let queue = WorkQueue::new(2);
    let processor: Arc<dyn Processor> = Arc::new(
        |_: &ItemContext, payload: &Value| -> anyhow::Result<Option<Value>> {
            Ok(Some(payload.clone()))
        },
    );
    let consumers = spawn_consumers(4, &queue, &ctx, &processor, &Limiters::default());

    for i in 0..10 {
        queue.put(item(&i.to_string())).unwrap();
    }
    for _ in 0..4 {
        queue.put(WorkSignal::Shutdown).unwrap();
    }
    for h in consumers {
        h.join().unwrap();
    }

    assert!(queue.is_empty());
    assert_eq!(queue.unfinished(), 0);
    assert_eq!(ctx.results.lock().unwrap().len(), 10);
    assert_eq!(ctx.state.snapshot().total_processed, 10);
}

#[test]
fn test_failed_items_are_still_acknowledged() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let queue = WorkQueue::new(4);
    let processor: Arc<dyn Processor> = Arc::new(
        |_: &ItemContext, _: &Value| -> anyhow::Result<Option<Value>> {
            Err(anyhow::anyhow!("service unavailable"))
        },
    );
    let consumers = spawn_consumers(2, &queue, &ctx, &processor, &Limiters::default());
    for id in ["a", "b", "c"] {
        queue.put(item(id)).unwrap();
    }
    queue.put(WorkSignal::Shutdown).unwrap();
    queue.put(WorkSignal::Shutdown).unwrap();
    for h in consumers {
        h.join().unwrap();
    }

    assert_eq!(queue.unfinished(), 0);
    assert_eq!(ctx.failed.lock().unwrap().len(), 3);
    assert!(ctx.results.lock().unwrap().is_empty());
    assert_eq!(ctx.state.snapshot().recorded_items(), 0);
}

#[test]
fn test_periodic_checkpoint_save() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CheckpointStore::open(dir.path()).unwrap());
    let ctx = PipelineContext::new(
        "ds",
        SharedState::default(),
        Arc::clone(&store),
        3,
        Arc::new(AtomicBool::new(false)),
    );
    let queue = WorkQueue::new(8);
    let processor: Arc<dyn Processor> = Arc::new(
        |_: &ItemContext, payload: &Value| -> anyhow::Result<Option<Value>> {
            Ok(Some(payload.clone()))
        },
    );
    let consumers = spawn_consumers(1, &queue, &ctx, &processor, &Limiters::default());
    for i in 0..4 {
        queue.put(item(&i.to_string())).unwrap();
    }
    queue.put(WorkSignal::Shutdown).unwrap();
    for h in consumers {
        h.join().unwrap();
    }

    // Saved after the 3rd success, not after the 4th (no final save without a runner).
    assert_eq!(store.load("ds").total_processed, 3);
    assert_eq!(ctx.state.snapshot().total_processed, 4);
}

// --- RateLimiter ---

#[test]
fn test_rate_limiter_two_per_second() {
    let limiter = RateLimiter::new(2, Duration::from_secs(1));
    let start = Instant::now();
    for _ in 0..10 {
        limiter.acquire();
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(4), "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "took {elapsed:?}");
}

#[test]
fn test_rate_limiter_allows_initial_burst() {
    let limiter = RateLimiter::new(3, Duration::from_secs(10));
    assert!(limiter.try_acquire().is_ok());
    assert!(limiter.try_acquire().is_ok());
    assert!(limiter.try_acquire().is_ok());
    let wait = limiter.try_acquire().unwrap_err();
    assert!(wait > Duration::from_secs(2));
}

#[test]
fn test_rate_limiter_is_shared_between_clones() {
    let limiter = RateLimiter::new(1, Duration::from_secs(10));
    let other = limiter.clone();
    assert!(limiter.try_acquire().is_ok());
    assert!(other.try_acquire().is_err());
}

// --- ConcurrencyLimiter ---

#[test]
fn test_session_permits_are_returned_on_drop() {
    let limiter = ConcurrencyLimiter::new(2);
    let a = limiter.acquire();
    let b = limiter.acquire();
    assert_eq!(limiter.available(), 0);
    assert!(limiter.try_acquire().is_none());
    drop(a);
    assert_eq!(limiter.available(), 1);
    let c = limiter.try_acquire();
    assert!(c.is_some());
    drop(b);
    drop(c);
    assert_eq!(limiter.available(), limiter.capacity());
}

#[test]
fn test_session_permit_released_after_panic() {
    let limiter = ConcurrencyLimiter::new(1);
    let inner = limiter.clone();
    let result = thread::spawn(move || {
        let _permit = inner.acquire();
        if inner.available() == 0 {
            panic!("call failed");
        }
    })
    .join();
    assert!(result.is_err());
    assert_eq!(limiter.available(), 1);
}

#[test]
fn test_limiters_from_stage_limits() {
    let none = Limiters::from_limits(&StageLimits::default());
    assert!(none.rate.is_none() && none.sessions.is_none());
    assert!(none.acquire().is_none());

    let both = Limiters::from_limits(&StageLimits {
        rate: Some((20, Duration::from_secs(1))),
        max_concurrent_sessions: Some(50),
    });
    assert_eq!(both.sessions.as_ref().map(|s| s.capacity()), Some(50));
    let permit = both.acquire();
    assert!(permit.is_some());
    assert_eq!(both.sessions.as_ref().map(|s| s.available()), Some(49));
}

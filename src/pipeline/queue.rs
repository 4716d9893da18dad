//! Bounded work queue between the producer and the consumer pool.

use crossbeam_channel::{Receiver, SendError, Sender, bounded};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::WorkSignal;

/// Bounded FIFO of [`WorkSignal`]s. `put` blocks while full, `get` blocks while empty.
///
/// Every signal taken with `get` must be acknowledged with [`task_done`](Self::task_done), whatever
/// happened to it; [`join`](Self::join) waits until all put signals were acknowledged. Cloning
/// shares the queue.
#[derive(Clone, Debug)]
pub struct WorkQueue {
    tx: Sender<WorkSignal>,
    rx: Receiver<WorkSignal>,
    capacity: usize,
    unfinished: Arc<(Mutex<usize>, Condvar)>,
}

impl WorkQueue {
    /// A zero `capacity` is treated as 1 (a zero-capacity channel would be a rendezvous).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            unfinished: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    /// Enqueue, blocking while the queue is full.
    pub fn put(&self, signal: WorkSignal) -> Result<(), SendError<WorkSignal>> {
        self.add_unfinished(1);
        self.tx.send(signal).inspect_err(|_| self.task_done())
    }

    /// Dequeue, blocking while the queue is empty.
    pub fn get(&self) -> Option<WorkSignal> {
        self.rx.recv().ok()
    }

    /// Acknowledge one signal taken with [`get`](Self::get).
    pub fn task_done(&self) {
        let (count, cvar) = &*self.unfinished;
        let mut count = count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            cvar.notify_all();
        }
    }

    /// Block until every put signal has been acknowledged.
    pub fn join(&self) {
        let (count, cvar) = &*self.unfinished;
        let mut count = count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = cvar.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn add_unfinished(&self, n: usize) {
        let (count, _) = &*self.unfinished;
        *count.lock().unwrap_or_else(PoisonError::into_inner) += n;
    }

    /// Signals put but not yet acknowledged.
    pub fn unfinished(&self) -> usize {
        *self.unfinished.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signals currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

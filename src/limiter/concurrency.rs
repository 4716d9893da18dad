use crossbeam_channel::{Receiver, Sender, bounded};

/// Counting permit set bounding simultaneous `process` calls.
///
/// Permits are tokens in a bounded channel: acquiring receives one, dropping the
/// [`SessionPermit`] sends it back. Cloning shares the permit set.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    permits_tx: Sender<()>,
    permits_rx: Receiver<()>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// A zero `capacity` is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (permits_tx, permits_rx) = bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel has room for exactly `capacity` tokens and we hold both ends.
            let _ = permits_tx.send(());
        }
        Self {
            permits_tx,
            permits_rx,
            capacity,
        }
    }

    /// Block until a permit is free.
    pub fn acquire(&self) -> SessionPermit {
        // Never disconnected: `self` holds a sender.
        let _ = self.permits_rx.recv();
        SessionPermit {
            permits_tx: self.permits_tx.clone(),
        }
    }

    pub fn try_acquire(&self) -> Option<SessionPermit> {
        self.permits_rx.try_recv().ok().map(|_| SessionPermit {
            permits_tx: self.permits_tx.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.permits_rx.len()
    }
}

/// A held session permit, returned on drop (including during unwinding).
#[derive(Debug)]
pub struct SessionPermit {
    permits_tx: Sender<()>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        let _ = self.permits_tx.send(());
    }
}

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Token-bucket rate limiter: a burst of `permits`, then one permit every `period / permits`.
///
/// Implemented as GCRA over a theoretical arrival time, so the schedule is exact in integer time
/// (10 calls at `(2, 1s)` take 4s). Cloning shares the bucket.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    interval: Duration,
    /// Slack before the theoretical arrival time: `(permits - 1) * interval`.
    burst: Duration,
    tat: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    /// `permits` must be > 0 and `period` non-zero (checked by [`PipelineOpts::validate`](crate::PipelineOpts::validate));
    /// a zero `permits` is treated as 1.
    pub fn new(permits: u32, period: Duration) -> Self {
        let permits = permits.max(1);
        let interval = period / permits;
        Self {
            interval,
            burst: interval * (permits - 1),
            tat: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Take a permit if one is free now; otherwise return how long until one is.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut tat = self.tat.lock().unwrap_or_else(PoisonError::into_inner);
        let arrival = (*tat).max(now);
        if now + self.burst >= arrival {
            *tat = arrival + self.interval;
            Ok(())
        } else {
            Err(arrival - (now + self.burst))
        }
    }

    /// Block until a permit is available.
    pub fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            thread::sleep(wait);
        }
    }
}

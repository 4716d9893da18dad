//! Outbound-call limits shared by every consumer of a stage.

pub mod concurrency;
pub mod rate;

pub use concurrency::{ConcurrencyLimiter, SessionPermit};
pub use rate::RateLimiter;

use crate::StageLimits;

/// The limiters of one stage. Either may be absent.
#[derive(Clone, Debug, Default)]
pub struct Limiters {
    pub rate: Option<RateLimiter>,
    pub sessions: Option<ConcurrencyLimiter>,
}

impl Limiters {
    pub fn from_limits(limits: &StageLimits) -> Self {
        Self {
            rate: limits
                .rate
                .map(|(permits, period)| RateLimiter::new(permits, period)),
            sessions: limits.max_concurrent_sessions.map(ConcurrencyLimiter::new),
        }
    }

    /// Block until a rate permit and a session permit are both held. The session permit is
    /// released when the returned guard drops.
    pub fn acquire(&self) -> Option<SessionPermit> {
        if let Some(rate) = &self.rate {
            rate.acquire();
        }
        self.sessions.as_ref().map(ConcurrencyLimiter::acquire)
    }
}

//! Minimum spacing between outbound classification calls.

use std::time::{Duration, Instant};

/// Time source for the limiter, so spacing can be checked without sleeping.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Blocks each caller until `interval` has passed since the previous
/// [`wait`](RateLimiter::wait) returned. There is no burst allowance: the
/// first call waits the full interval too.
///
/// Owned by a single pipeline run. Sharing it between workers would need a
/// `Mutex` around it.
pub struct RateLimiter<C = SystemClock> {
    interval: Duration,
    last: Option<Instant>,
    clock: C,
}

impl RateLimiter<SystemClock> {
    pub fn new(interval: Duration) -> Self {
        Self::with_clock(interval, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(interval: Duration, clock: C) -> Self {
        Self {
            interval,
            last: None,
            clock,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn wait(&mut self) {
        let now = self.clock.now();
        let ready_at = match self.last {
            Some(last) => last + self.interval,
            None => now + self.interval,
        };

        let remaining = ready_at.saturating_duration_since(now);
        if !remaining.is_zero() {
            self.clock.sleep(remaining);
        }

        self.last = Some(self.clock.now());
    }
}

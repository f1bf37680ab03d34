//! Task rate limiter for retry paths
//!
//! Token bucket with an initial burst and a slow refill: `initial_burst`
//! tasks run immediately, then one more per `refill_period`. When no token
//! is available the attempt is dropped, not queued - the point is to cap
//! retry storms on error paths, not to smooth throughput.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Rate limiter gating side-effecting attempts.
pub struct TaskRateLimiter {
    refill_period: Duration,
    state: Mutex<State>,
}

struct State {
    tokens: u64,
    last_refill: Instant,
}

impl TaskRateLimiter {
    /// A `refill_period_secs` of zero disables limiting entirely.
    pub fn new(initial_burst: u64, refill_period_secs: u64) -> Self {
        Self {
            refill_period: Duration::from_secs(refill_period_secs),
            state: Mutex::new(State {
                tokens: initial_burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a token if one is available.
    pub fn allow(&self) -> bool {
        if self.refill_period.is_zero() {
            return true;
        }

        let mut state = self.state.lock();
        let elapsed = state.last_refill.elapsed();
        let refills = (elapsed.as_nanos() / self.refill_period.as_nanos()) as u64;
        if refills > 0 {
            state.tokens += refills;
            state.last_refill += self.refill_period * refills as u32;
        }

        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Run `task` if a token is available; otherwise drop it.
    ///
    /// Returns whether the task ran.
    pub fn attempt(&self, task: impl FnOnce()) -> bool {
        if self.allow() {
            task();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_period_does_not_throttle() {
        let limiter = TaskRateLimiter::new(0, 0);
        let mut count = 0;
        for _ in 0..10 {
            limiter.attempt(|| count += 1);
        }
        assert_eq!(count, 10);
    }

    #[test]
    fn test_no_burst_throttles_everything() {
        let limiter = TaskRateLimiter::new(0, 3600);
        let mut count = 0;
        for _ in 0..10 {
            limiter.attempt(|| count += 1);
        }
        assert_eq!(count, 0);
    }

    #[test]
    fn test_throttles_after_initial_burst() {
        let limiter = TaskRateLimiter::new(5, 3600);
        let mut count = 0;
        for _ in 0..10 {
            limiter.attempt(|| count += 1);
        }
        assert_eq!(count, 5);
    }

    #[test]
    fn test_attempt_reports_whether_task_ran() {
        let limiter = TaskRateLimiter::new(1, 3600);
        assert!(limiter.attempt(|| {}));
        assert!(!limiter.attempt(|| {}));
    }
}

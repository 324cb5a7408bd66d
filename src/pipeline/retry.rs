//! Backoff decision: `(error kind, attempt) -> retry after delay | abort`.
//!
//! Kept pure so the schedule can be unit-tested without a clock. The
//! orchestrator owns the sleeping; this module only answers "again, and
//! when?".
//!
//! With the defaults (5 attempts, 5 s base) the waits after attempts 1–4 are
//! 7 s, 9 s, 13 s and 21 s. A fifth transient failure aborts at once: there
//! is nothing left to wait for.

use crate::error::ErrorKind;
use std::time::Duration;

/// What the orchestrator should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    Abort,
}

/// Bounded exponential backoff over attempts numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Decide after `attempt` (1-based) failed with an error of `kind`.
    pub fn decide(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        match kind {
            ErrorKind::Permanent => RetryDecision::Abort,
            ErrorKind::Transient if attempt >= self.max_attempts => RetryDecision::Abort,
            ErrorKind::Transient => RetryDecision::Retry(self.delay_after(attempt)),
        }
    }

    /// `2^attempt` seconds plus the fixed base.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        // 2^63 s already exceeds any real wait; saturate rather than overflow.
        let exp = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(exp).saturating_add(self.base_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule() {
        let p = RetryPolicy::default();
        let delays: Vec<u64> = (1..5)
            .map(|n| match p.decide(ErrorKind::Transient, n) {
                RetryDecision::Retry(d) => d.as_secs(),
                RetryDecision::Abort => panic!("attempt {n} should retry"),
            })
            .collect();
        assert_eq!(delays, [7, 9, 13, 21]);
    }

    #[test]
    fn last_attempt_aborts() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(ErrorKind::Transient, 5), RetryDecision::Abort);
        assert_eq!(p.decide(ErrorKind::Transient, 9), RetryDecision::Abort);
    }

    #[test]
    fn permanent_never_retries() {
        let p = RetryPolicy::default();
        for attempt in 1..=5 {
            assert_eq!(p.decide(ErrorKind::Permanent, attempt), RetryDecision::Abort);
        }
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        let p = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.decide(ErrorKind::Transient, 1), RetryDecision::Abort);
    }

    #[test]
    fn huge_attempt_saturates() {
        let p = RetryPolicy::new(u32::MAX, Duration::from_secs(5));
        assert_eq!(p.delay_after(200), Duration::MAX);
    }
}

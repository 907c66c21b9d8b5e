//! Exponential reconnection backoff

use std::time::Duration;

/// Stateless mapping from retry attempt to delay.
///
/// `delay = min(base * 2^min(attempt - 1, max_shift), cap)`. Attempt 1 is the
/// first retry after a failure; the caller owns the attempt counter and resets
/// it when a connection is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    max_shift: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_shift: 6,
        }
    }
}

impl BackoffPolicy {
    /// Build a policy; a cap below `base` is raised to `base`
    pub fn new(base: Duration, cap: Duration, max_shift: u32) -> Self {
        Self {
            base,
            cap: cap.max(base),
            max_shift,
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay to wait before retry number `attempt`
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(self.max_shift);
        let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_progression() {
        let policy = BackoffPolicy::default();
        let secs: Vec<u64> = (1..=9).map(|a| policy.next_delay(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn test_attempt_zero_is_treated_as_first() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.next_delay(0), policy.next_delay(1));
    }

    #[test]
    fn test_max_shift_saturates_before_cap() {
        let policy = BackoffPolicy::new(Duration::from_secs(3), Duration::from_secs(600), 2);
        assert_eq!(policy.next_delay(3), Duration::from_secs(12));
        assert_eq!(policy.next_delay(50), Duration::from_secs(12));
    }

    #[test]
    fn test_cap_never_below_base() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(1), 6);
        assert_eq!(policy.cap(), Duration::from_secs(5));
        assert_eq!(policy.next_delay(4), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_shift_does_not_overflow() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 64);
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(60));
    }

    proptest! {
        #[test]
        fn delay_is_monotonic_and_capped(
            base_ms in 1u64..5_000,
            cap_ms in 1u64..120_000,
            max_shift in 0u32..40,
            attempt in 1u32..10_000,
        ) {
            let policy = BackoffPolicy::new(
                Duration::from_millis(base_ms),
                Duration::from_millis(cap_ms),
                max_shift,
            );
            let current = policy.next_delay(attempt);
            let next = policy.next_delay(attempt + 1);
            prop_assert!(current <= next);
            prop_assert!(next <= policy.cap());
            prop_assert!(current >= policy.base().min(policy.cap()));
        }
    }
}

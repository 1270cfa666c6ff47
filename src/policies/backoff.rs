//! # Retry pacing for blocked mailboxes.
//!
//! [`BackoffPolicy`] decides how long a destination whose mailbox was full
//! rests before the deliverer knocks again. It is parameterized by:
//! - [`BackoffPolicy::first`] the delay after the first full-mailbox answer;
//! - [`BackoffPolicy::factor`] the multiplicative growth per further failure;
//! - [`BackoffPolicy::max`] the cap.
//!
//! The delay after `n` consecutive failures (0-indexed) is `first × factor^n`,
//! clamped to `max`, then jittered. The base never depends on a previous
//! jittered value, so randomization cannot make delays drift downwards.
//!
//! The default (`factor = 1.0`, no jitter) reproduces a fixed retry interval.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use registrar::{BackoffPolicy, JitterPolicy};
//!
//! let pacing = BackoffPolicy {
//!     first: Duration::from_millis(20),
//!     max: Duration::from_millis(500),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(pacing.next(0), Duration::from_millis(20));
//! assert_eq!(pacing.next(3), Duration::from_millis(160));
//! assert_eq!(pacing.next(20), Duration::from_millis(500));
//! ```

use std::time::Duration;

use super::jitter::JitterPolicy;

/// Delay schedule for retrying a full mailbox.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth factor per additional failure (`1.0` = constant).
    pub factor: f64,
    /// Randomization applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 20 ms, capped at 1 s, no jitter.
    fn default() -> Self {
        Self::constant(Duration::from_millis(20))
    }
}

impl BackoffPolicy {
    /// A policy that always waits `delay`.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay.max(Duration::from_secs(1)),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Delay before the next attempt after `failures` consecutive full answers
    /// beyond the first one.
    pub fn next(&self, failures: u32) -> Duration {
        let exp = failures.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(factor: f64, jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(20),
            max: Duration::from_secs(1),
            factor,
            jitter,
        }
    }

    #[test]
    fn default_is_a_fixed_interval() {
        let p = BackoffPolicy::default();
        for failures in 0..50 {
            assert_eq!(p.next(failures), Duration::from_millis(20));
        }
    }

    #[test]
    fn grows_geometrically_until_capped() {
        let p = policy(2.0, JitterPolicy::None);
        assert_eq!(p.next(0), Duration::from_millis(20));
        assert_eq!(p.next(1), Duration::from_millis(40));
        assert_eq!(p.next(2), Duration::from_millis(80));
        assert_eq!(p.next(6), Duration::from_secs(1));
        assert_eq!(p.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn first_above_max_is_clamped() {
        let p = BackoffPolicy {
            first: Duration::from_secs(5),
            max: Duration::from_secs(1),
            factor: 1.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(p.next(0), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_base() {
        let p = policy(2.0, JitterPolicy::Equal);
        for failures in 0..10 {
            let base = policy(2.0, JitterPolicy::None).next(failures);
            let d = p.next(failures);
            assert!(d <= base, "failures={failures}: {d:?} > {base:?}");
            assert!(d >= base / 2 - Duration::from_millis(1));
        }
    }
}

//! # Idle backoff for workers polling an empty queue.
//!
//! [`BackoffPolicy`] controls how long a worker sleeps after finding nothing to crawl.
//! It is parameterized by:
//! - [`BackoffPolicy::first`] the delay after the first empty poll;
//! - [`BackoffPolicy::factor`] the multiplicative growth per further empty poll;
//! - [`BackoffPolicy::max`] the cap.
//!
//! The delay for the `n`-th consecutive empty poll is `first × factor^n`, clamped to `max`,
//! then jittered. The base is derived from `n` alone, so jitter never feeds back.
//! The default is a constant 100ms; submissions wake sleeping workers anyway, so growth
//! only matters for external sources and long idle periods.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use crawlvisor::{BackoffPolicy, JitterPolicy};
//!
//! let idle = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(2),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(idle.next(0), Duration::from_millis(100));
//! assert_eq!(idle.next(3), Duration::from_millis(800));
//! assert_eq!(idle.next(10), Duration::from_secs(2));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Idle polling backoff.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first empty poll.
    pub first: Duration,
    /// Maximum delay.
    pub max: Duration,
    /// Multiplicative growth factor (`1.0` = constant).
    pub factor: f64,
    /// Randomization so idle workers do not wake in lockstep.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 100ms (`factor = 1.0`, `max = 100ms`, no jitter).
    fn default() -> Self {
        Self::constant(Duration::from_millis(100))
    }
}

impl BackoffPolicy {
    /// Same delay after every empty poll.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay for the given count of consecutive empty polls (0-indexed).
    ///
    /// # Notes
    /// - `factor < 1.0` makes delays shrink (not typical).
    /// - Non-finite or negative intermediate values clamp to `max`.
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let clamped_exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(clamped_exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

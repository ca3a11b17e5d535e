//! # Exponential Backoff
//!
//! Per-item retry delays for the work queue.
//!
//! The delay doubles with every consecutive failure of the same item and is
//! capped at a maximum, so a volume whose backend keeps failing settles at a
//! fixed retry cadence instead of growing without bound.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use volume_health_monitor::controller::backoff::ExponentialBackoff;
//!
//! let backoff = ExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1000));
//! assert_eq!(backoff.delay(0), Duration::from_millis(5));
//! assert_eq!(backoff.delay(1), Duration::from_millis(10));
//! assert_eq!(backoff.delay(2), Duration::from_millis(20));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Stateless: the number of prior failures is tracked by the caller (the work
/// queue keeps one counter per item) and passed to [`ExponentialBackoff::delay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay after the first failure
    base: Duration,
    /// Upper bound for any delay
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `base` and capped at `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `failures` (0 for the first retry)
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use volume_health_monitor::controller::backoff::ExponentialBackoff;
    ///
    /// let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10));
    /// assert_eq!(backoff.delay(3), Duration::from_secs(8));
    /// assert_eq!(backoff.delay(4), Duration::from_secs(10)); // capped
    /// ```
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        // 2^31 * base already exceeds any sensible cap
        let factor = 1u32 << failures.min(31);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }
}

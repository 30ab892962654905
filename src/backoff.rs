//! Randomized, capped retry delays.
//!
//! The relay never retries on its own. Callers that do (replication loops,
//! reconnecting change feeds) feed the previous window back in to get the
//! next delay:
//!
//! ```
//! use docrelay::backoff::{default_backoff, random_delay, MAX_TIMEOUT_MS};
//!
//! let first = default_backoff(None);
//! assert!(first <= 2000);
//!
//! let next = default_backoff(Some(1000));
//! assert!((1000..2000).contains(&next));
//!
//! assert!(random_delay(900_000, None) <= MAX_TIMEOUT_MS);
//! ```

use rand::Rng;
use std::time::Duration;

/// Hard ceiling for any computed delay (10 minutes).
pub const MAX_TIMEOUT_MS: u64 = 600_000;

/// Upper bound of the window used when no minimum is known yet.
pub const DEFAULT_WINDOW_MS: u64 = 2_000;

/// Draw a delay in milliseconds from the window described by `min`/`max`.
///
/// - `max` set and greater than `min`: uniform in `[min, max]`.
/// - otherwise: uniform in `[min, 2 * min)`, or `[0, 2)` when `min` is 0.
///
/// If the window would exceed [`MAX_TIMEOUT_MS`] it collapses to
/// `[MAX_TIMEOUT_MS / 2, MAX_TIMEOUT_MS)`.
pub fn random_delay(min: u64, max: Option<u64>) -> u64 {
    let mut min = min;
    // Exclusive upper bound.
    let mut upper = match max {
        Some(max) if max > min => max.saturating_add(1),
        _ => min.max(1).saturating_mul(2),
    };

    if upper > MAX_TIMEOUT_MS {
        min = MAX_TIMEOUT_MS / 2;
        upper = MAX_TIMEOUT_MS;
    }

    rand::rng().random_range(min..upper)
}

/// Next delay given the previous one.
///
/// An unset or zero minimum starts from the `[0, 2000]` window; otherwise the
/// window is `[min, 2 * min)`.
pub fn default_backoff(min: Option<u64>) -> u64 {
    match min {
        Some(min) if min > 0 => random_delay(min, None),
        _ => random_delay(0, Some(DEFAULT_WINDOW_MS)),
    }
}

/// Previous delay bounds, fed back in to compute the next delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackoffWindow {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl BackoffWindow {
    pub fn new(min: Option<u64>, max: Option<u64>) -> Self {
        Self { min, max }
    }

    /// Draw the next delay in milliseconds.
    pub fn next_delay(&self) -> u64 {
        match (self.min, self.max) {
            (None, None) => default_backoff(None),
            (min, max) => random_delay(min.unwrap_or(0), max),
        }
    }

    /// Draw the next delay as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.next_delay())
    }
}

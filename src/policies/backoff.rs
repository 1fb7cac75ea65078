//! # Backoff policy for retrying a failed subgraph.
//!
//! [`BackoffPolicy`] controls how retry delays grow after repeated failures and
//! how long the retry controller keeps trying. It is parameterized by:
//! - [`BackoffPolicy::first`] the initial delay;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the maximum delay cap;
//! - [`BackoffPolicy::max_elapsed`] the total retry budget.
//!
//! The delay for attempt `n` is computed as `first × factor^n`, clamped to `max`,
//! then jitter is applied. The base delay is derived purely from the attempt
//! number, so jitter output never feeds back into subsequent calculations.
//!
//! A retry run is tracked by [`Backoff`] (see [`BackoffPolicy::start`]): it hands
//! out delays until the elapsed budget would be exceeded, then returns `None`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use plugvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     max_elapsed: Duration::from_secs(60),
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! // 100ms × 2^10 = 102_400ms → capped at max=10s
//! assert_eq!(backoff.next(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Initial delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap for retries.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Total time budget for one retry run. `0s` disables retrying.
    pub max_elapsed: Duration,
    /// Jitter policy to prevent thundering herd.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `first = 1s`;
    /// - `factor = 1.5`;
    /// - `max = 60s`;
    /// - `max_elapsed = 60s`.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 1.5,
            max_elapsed: Duration::from_secs(60),
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// # Notes
    /// - If `factor` equals 1.0, delay remains constant at `first` (up to `max`).
    /// - If `factor` is greater than 1.0, delays grow exponentially up to `max`.
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
        self.jitter.apply(base)
    }

    /// Starts a retry run measured from now.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            started: Instant::now(),
            attempt: 0,
        }
    }
}

/// State of one retry run.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    started: Instant,
    attempt: u32,
}

impl Backoff {
    /// Returns the delay before the next attempt, or `None` once waiting that
    /// long would exceed [`BackoffPolicy::max_elapsed`].
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.policy.next(self.attempt);
        if self.elapsed() + delay > self.policy.max_elapsed {
            return None;
        }
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    /// Number of delays handed out so far.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Time since the run started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

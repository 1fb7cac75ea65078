//! # Container configuration.
//!
//! Provides [`Config`]: centralized settings for a [`Container`](crate::Container).
//!
//! ## Sentinel values
//! - `stop_timeout = 0s` → stop does not wait: every still-started plugin is reported as stuck
//! - `backoff.max_elapsed = 0s` → the retry controller gives up on the first failed re-init
//! - capacities of `0` are clamped to `1`

use std::time::Duration;

use crate::policies::{BackoffPolicy, RestartPolicy};

/// Global configuration for the container runtime.
///
/// ## Field semantics
/// - `stop_timeout`: global deadline for [`Container::stop`](crate::Container::stop)
/// - `restart`: incident handling (`OnFailure` = retry subgraph, `Never` = full stop)
/// - `backoff`: retry pacing and total retry budget
/// - `bus_capacity`: event bus ring buffer size
/// - `incident_capacity`: queue between monitors and the incident consumer
/// - `result_capacity`: queue of results returned by [`Container::serve`](crate::Container::serve)
///
/// ## Notes
/// All fields are public. Prefer the clamped accessors to avoid sprinkling
/// sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time `stop` waits for every plugin to stop.
    ///
    /// When the deadline elapses, `stop` returns
    /// [`ContainerError::StopTimeout`](crate::ContainerError::StopTimeout)
    /// naming every plugin that was still running.
    pub stop_timeout: Duration,

    /// What to do with a serve-time incident.
    pub restart: RestartPolicy,

    /// Backoff used by the retry controller.
    pub backoff: BackoffPolicy,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Capacity of the incident channel.
    ///
    /// Monitors block when it is full; the single consumer processes one
    /// incident at a time.
    pub incident_capacity: usize,

    /// Capacity of the result channel handed to the caller of `serve`.
    pub result_capacity: usize,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns an incident channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn incident_capacity_clamped(&self) -> usize {
        self.incident_capacity.max(1)
    }

    /// Returns a result channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn result_capacity_clamped(&self) -> usize {
        self.result_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `stop_timeout = 10s`
    /// - `restart = RestartPolicy::OnFailure`
    /// - `backoff = BackoffPolicy::default()` (1s initial, 60s budget)
    /// - `bus_capacity = 1024`
    /// - `incident_capacity = 1`
    /// - `result_capacity = 64`
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(10),
            restart: RestartPolicy::default(),
            backoff: BackoffPolicy::default(),
            bus_capacity: 1024,
            incident_capacity: 1,
            result_capacity: 64,
        }
    }
}

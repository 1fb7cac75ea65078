//! # Runtime events emitted by the container.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Registration events**: plugins added or excluded from the graph
//! - **Lifecycle events**: per-plugin init / serve / stop and container state changes
//! - **Supervision events**: incidents, retries, backoff and exhaustion
//! - **Shutdown events**: stop requested, completed in time or timed out
//!
//! The [`Event`] struct carries additional metadata such as timestamps, plugin
//! name, reasons, attempts and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use plugvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_plugin("http")
//!     .with_reason("connection refused")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(2));
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.plugin.as_deref(), Some("http"));
//! assert_eq!(ev.delay_ms, Some(2_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::state::State;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `plugin`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `plugin`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Registration events ===
    /// Plugin accepted by `Container::register`.
    ///
    /// Sets:
    /// - `plugin`: plugin name
    PluginRegistered,

    /// Plugin excluded from the run-list (opt-out, missing or disabled dependency).
    ///
    /// Sets:
    /// - `plugin`: plugin name
    /// - `reason`: disable reason
    PluginDisabled,

    // === Lifecycle events ===
    /// Container FSM changed state.
    ///
    /// Sets:
    /// - `state`: new container state
    StateChanged,

    /// Plugin `init` is about to run.
    ///
    /// Sets:
    /// - `plugin`: plugin name
    /// - `attempt`: attempt number (only during retry)
    PluginInitializing,

    /// Plugin `init` (and its collectors) completed.
    ///
    /// Sets:
    /// - `plugin`: plugin name
    PluginInitialized,

    /// Plugin `serve` returned and its monitor is running.
    ///
    /// Sets:
    /// - `plugin`: plugin name
    PluginServing,

    /// Plugin `stop` returned.
    ///
    /// Sets:
    /// - `plugin`: plugin name
    /// - `reason`: stop error, if any
    PluginStopped,

    // === Supervision events ===
    /// A running plugin reported a failure.
    ///
    /// Sets:
    /// - `plugin`: plugin name
    /// - `reason`: failure message
    IncidentReported,

    /// Retry controller began resetting the affected subgraph.
    ///
    /// Sets:
    /// - `plugin`: failed plugin name
    /// - `reason`: names of the affected plugins
    RetryStarted,

    /// Next re-init attempt scheduled.
    ///
    /// Sets:
    /// - `plugin`: plugin being retried
    /// - `attempt`: failed attempt number
    /// - `delay_ms`: delay before the next attempt (ms)
    /// - `reason`: last failure message
    BackoffScheduled,

    /// Affected subgraph serves again.
    ///
    /// Sets:
    /// - `plugin`: failed plugin name
    RetrySucceeded,

    /// Retry gave up: budget spent or terminal error.
    ///
    /// Sets:
    /// - `plugin`: plugin that could not be recovered
    /// - `attempt`: attempts made
    /// - `reason`: last failure message
    BackoffExhausted,

    // === Shutdown events ===
    /// `Container::stop` began.
    ///
    /// Sets:
    /// - `timeout_ms`: global stop deadline (ms)
    StopRequested,

    /// Every plugin stopped within the deadline.
    AllStoppedWithin,

    /// Deadline elapsed; some plugins did not stop in time.
    ///
    /// Sets:
    /// - `timeout_ms`: global stop deadline (ms)
    /// - `reason`: names of the plugins still running
    StopTimeoutExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Stop deadline in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Backoff delay before next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Name of the plugin, if applicable.
    pub plugin: Option<Arc<str>>,
    /// Container state, for [`EventKind::StateChanged`].
    pub state: Option<State>,
    /// Event classification.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            kind,
            at: SystemTime::now(),
            attempt: None,
            timeout_ms: None,
            reason: None,
            delay_ms: None,
            plugin: None,
            state: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a plugin name.
    #[inline]
    pub fn with_plugin(mut self, plugin: impl Into<Arc<str>>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a container state.
    #[inline]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_plugin(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_plugin(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

//! # LogWriter: renders events through `tracing`
//!
//! A minimal subscriber that turns every incoming [`Event`] into a `tracing`
//! record under the `plugvisor::events` target. Install any `tracing`
//! subscriber in the application to see them.
//!
//! ## Example output (with a fmt subscriber)
//! ```text
//! INFO plugvisor::events: registered plugin="db"
//! WARN plugvisor::events: incident plugin="http" reason="plugin failed: port in use"
//! INFO plugvisor::events: backoff plugin="http" attempt=1 delay_ms=1000
//! ERROR plugvisor::events: stop-timeout timeout_ms=10000 stuck="slow"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "plugvisor::events";

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let plugin = e.plugin.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::PluginRegistered => tracing::info!(target: TARGET, plugin, "registered"),
            EventKind::PluginDisabled => tracing::info!(target: TARGET, plugin, reason, "disabled"),
            EventKind::StateChanged => {
                let state = e.state.map(|s| s.as_str()).unwrap_or("-");
                tracing::info!(target: TARGET, state, "container state")
            }
            EventKind::PluginInitializing => {
                tracing::debug!(target: TARGET, plugin, attempt = ?e.attempt, "initializing")
            }
            EventKind::PluginInitialized => tracing::info!(target: TARGET, plugin, "initialized"),
            EventKind::PluginServing => tracing::info!(target: TARGET, plugin, "serving"),
            EventKind::PluginStopped => tracing::info!(target: TARGET, plugin, reason, "stopped"),
            EventKind::IncidentReported => tracing::warn!(target: TARGET, plugin, reason, "incident"),
            EventKind::RetryStarted => tracing::info!(target: TARGET, plugin, affected = reason, "retry"),
            EventKind::BackoffScheduled => tracing::info!(
                target: TARGET,
                plugin,
                attempt = ?e.attempt,
                delay_ms = ?e.delay_ms,
                reason,
                "backoff"
            ),
            EventKind::RetrySucceeded => tracing::info!(target: TARGET, plugin, "recovered"),
            EventKind::BackoffExhausted => {
                tracing::error!(target: TARGET, plugin, attempt = ?e.attempt, reason, "retry exhausted")
            }
            EventKind::StopRequested => {
                tracing::info!(target: TARGET, timeout_ms = ?e.timeout_ms, "stop requested")
            }
            EventKind::AllStoppedWithin => tracing::info!(target: TARGET, "all stopped within timeout"),
            EventKind::StopTimeoutExceeded => {
                tracing::error!(target: TARGET, timeout_ms = ?e.timeout_ms, stuck = reason, "stop-timeout")
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: TARGET, subscriber = plugin, reason, "subscriber-overflow")
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(target: TARGET, subscriber = plugin, reason, "subscriber-panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

//! Error types used by the container and by plugins.
//!
//! This module defines three error types:
//!
//! - [`PluginError`] — errors returned by plugin callbacks (`init`, `serve` streams, `stop`).
//! - [`ContainerError`] — errors raised by the container itself, tagged with the [`Op`] that failed.
//! - [`StateError`] — an event was fired outside its legal source state.
//!
//! All of them provide `as_label` for logging; [`PluginError::is_retryable`]
//! tells the retry controller whether a failed re-init may be attempted again.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::state::State;

/// # Errors produced by plugin callbacks.
///
/// `Disabled` is not a failure: it is a plugin opting out of the container.
/// Its dependents are excluded with it and initialization continues.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// The plugin opted out; exclude it (and its dependents) instead of failing.
    #[error("plugin disabled")]
    Disabled,

    /// The operation failed but may succeed if retried.
    #[error("plugin failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error (never retried).
    #[error("fatal plugin error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The operation was cancelled because the container is shutting down.
    #[error("operation cancelled")]
    Canceled,
}

impl PluginError {
    /// Shorthand for [`PluginError::Fail`].
    pub fn fail(error: impl fmt::Display) -> Self {
        PluginError::Fail {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`PluginError::Fatal`].
    pub fn fatal(error: impl fmt::Display) -> Self {
        PluginError::Fatal {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use plugvisor::PluginError;
    ///
    /// assert_eq!(PluginError::Disabled.as_label(), "plugin_disabled");
    /// assert_eq!(PluginError::fail("boom").as_label(), "plugin_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PluginError::Disabled => "plugin_disabled",
            PluginError::Fail { .. } => "plugin_failed",
            PluginError::Fatal { .. } => "plugin_fatal",
            PluginError::Canceled => "plugin_canceled",
        }
    }

    /// Indicates whether the error is safe to retry.
    ///
    /// Only [`PluginError::Fail`] is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PluginError::Fail { .. })
    }
}

/// Container operation that produced a [`ContainerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Register,
    Init,
    Serve,
    Stop,
    Retry,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Register => "register",
            Op::Init => "init",
            Op::Serve => "serve",
            Op::Stop => "stop",
            Op::Retry => "retry",
        };
        f.write_str(s)
    }
}

/// Event was requested outside of its legal source state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {requested} while container is {current}")]
pub struct StateError {
    /// State the container was in.
    pub current: State,
    /// Name of the requested event.
    pub requested: &'static str,
}

/// # Errors produced by the container.
///
/// Every variant maps to the operation that raised it (see [`ContainerError::op`]).
/// Missing dependencies are not errors: the requesting plugin is disabled and
/// logged instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ContainerError {
    /// A plugin of the same concrete type is already registered.
    #[error("register: plugin {plugin} is already registered")]
    AlreadyRegistered { plugin: String },

    /// A plugin declared a primitive type as a dependency or collected/provided type.
    #[error("register: plugin {plugin} declares primitive type {capability}; only capability types are allowed")]
    PrimitiveCapability { plugin: String, capability: &'static str },

    /// The FSM rejected the requested event.
    #[error("{op}: {source}")]
    InvalidState {
        op: Op,
        #[source]
        source: StateError,
    },

    /// A concrete capability has more than one provider.
    #[error("init: plugin {plugin} needs {capability} but it is provided by several plugins: {candidates:?}")]
    AmbiguousProvider {
        plugin: String,
        capability: &'static str,
        candidates: Vec<String>,
    },

    /// A concrete collector argument has no provider.
    #[error("init: plugin {plugin} collects {capability} but no plugin provides it")]
    UnresolvedCollector { plugin: String, capability: &'static str },

    /// Dependency graph contains a cycle; `path` is in discovery order.
    #[error("init: dependency cycle detected: {path:?}")]
    Cycle { path: Vec<String> },

    /// Nothing left to run after disabling.
    #[error("init: no enabled plugins left to initialize")]
    NoPlugins,

    /// A vertex was reached before all of its dependencies were initialized.
    #[error("{op}: plugin {plugin} has {pending} uninitialized dependencies")]
    DependencyNotReady { op: Op, plugin: String, pending: usize },

    /// `Plugin::init` failed.
    #[error("{op}: plugin {plugin} failed to initialize: {source}")]
    Init {
        op: Op,
        plugin: String,
        #[source]
        source: PluginError,
    },

    /// A collector callback or the provider feeding it failed.
    #[error("{op}: plugin {plugin} failed to collect from {provider}: {source}")]
    Collect {
        op: Op,
        plugin: String,
        provider: String,
        #[source]
        source: PluginError,
    },

    /// `Service::serve` reported an error (synchronously or as an incident).
    #[error("serve: plugin {plugin} failed: {source}")]
    Serve {
        plugin: String,
        #[source]
        source: PluginError,
    },

    /// One or more `Service::stop` calls failed.
    #[error("stop: {} plugin(s) failed to stop: {failures:?}", .failures.len())]
    Stop { failures: Vec<(String, PluginError)> },

    /// Global stop timeout elapsed; `stuck` vertices were still started or stopping.
    #[error("stop: timeout {timeout:?} exceeded; stuck: {stuck:?}")]
    StopTimeout { timeout: Duration, stuck: Vec<String> },

    /// The retry controller gave up on a failed subgraph.
    #[error("retry: plugin {plugin} not recovered after {attempts} attempt(s) in {elapsed:?}: {source}")]
    BackoffExhausted {
        plugin: String,
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: PluginError,
    },

    /// The operation was interrupted by a stop request.
    #[error("{op}: cancelled by stop request")]
    Canceled { op: Op },
}

impl ContainerError {
    /// Returns the operation this error belongs to.
    pub fn op(&self) -> Op {
        match self {
            ContainerError::AlreadyRegistered { .. } | ContainerError::PrimitiveCapability { .. } => {
                Op::Register
            }
            ContainerError::AmbiguousProvider { .. }
            | ContainerError::UnresolvedCollector { .. }
            | ContainerError::Cycle { .. }
            | ContainerError::NoPlugins => Op::Init,
            ContainerError::Serve { .. } => Op::Serve,
            ContainerError::Stop { .. } | ContainerError::StopTimeout { .. } => Op::Stop,
            ContainerError::BackoffExhausted { .. } => Op::Retry,
            ContainerError::InvalidState { op, .. }
            | ContainerError::DependencyNotReady { op, .. }
            | ContainerError::Init { op, .. }
            | ContainerError::Collect { op, .. }
            | ContainerError::Canceled { op } => *op,
        }
    }

    /// The plugin error behind this failure, if a plugin callback caused it.
    pub fn plugin_error(&self) -> Option<&PluginError> {
        match self {
            ContainerError::Init { source, .. }
            | ContainerError::Collect { source, .. }
            | ContainerError::Serve { source, .. }
            | ContainerError::BackoffExhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use plugvisor::ContainerError;
    ///
    /// let err = ContainerError::Cycle { path: vec!["a".into(), "b".into()] };
    /// assert_eq!(err.as_label(), "dependency_cycle");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ContainerError::AlreadyRegistered { .. } => "already_registered",
            ContainerError::PrimitiveCapability { .. } => "primitive_capability",
            ContainerError::InvalidState { .. } => "invalid_state",
            ContainerError::AmbiguousProvider { .. } => "ambiguous_provider",
            ContainerError::UnresolvedCollector { .. } => "unresolved_collector",
            ContainerError::Cycle { .. } => "dependency_cycle",
            ContainerError::NoPlugins => "no_plugins",
            ContainerError::DependencyNotReady { .. } => "dependency_not_ready",
            ContainerError::Init { .. } => "init_failed",
            ContainerError::Collect { .. } => "collect_failed",
            ContainerError::Serve { .. } => "serve_failed",
            ContainerError::Stop { .. } => "stop_failed",
            ContainerError::StopTimeout { .. } => "stop_timeout",
            ContainerError::BackoffExhausted { .. } => "backoff_exhausted",
            ContainerError::Canceled { .. } => "canceled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fail_is_retryable() {
        assert!(PluginError::fail("boom").is_retryable());
        assert!(!PluginError::fatal("nope").is_retryable());
        assert!(!PluginError::Disabled.is_retryable());
        assert!(!PluginError::Canceled.is_retryable());
    }

    #[test]
    fn errors_carry_their_operation() {
        let err = ContainerError::StopTimeout {
            timeout: Duration::from_secs(1),
            stuck: vec!["db".into()],
        };
        assert_eq!(err.op(), Op::Stop);

        let err = ContainerError::Init {
            op: Op::Retry,
            plugin: "db".into(),
            source: PluginError::fail("down"),
        };
        assert_eq!(err.op(), Op::Retry);
        assert!(err.to_string().starts_with("retry:"));
    }

    #[test]
    fn state_error_names_current_and_requested() {
        let err = StateError {
            current: State::Stopped,
            requested: "start",
        };
        assert_eq!(err.to_string(), "cannot start while container is stopped");
    }
}

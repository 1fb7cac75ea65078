//! # Incident handling policy.
//!
//! [`RestartPolicy`] decides what the incident consumer does when a running
//! plugin reports a failure.
//!
//! ```text
//! RestartPolicy::OnFailure  → reset the failed plugin + its dependents, retry with backoff
//! RestartPolicy::Never      → stop the whole container, forward the failure
//! ```

/// Policy applied to serve-time incidents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart: an incident stops the whole container.
    Never,
    /// Restart the affected subgraph with backoff (default).
    #[default]
    OnFailure,
}

impl RestartPolicy {
    /// Whether incidents are handed to the retry controller.
    #[inline]
    pub fn retries(&self) -> bool {
        matches!(self, RestartPolicy::OnFailure)
    }
}

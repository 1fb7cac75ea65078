//! Retry and restart policies.
//!
//! This module groups the knobs that control **whether** a failed subgraph is
//! restarted and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RestartPolicy`] what to do with an incident (retry / full stop)
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max / max_elapsed + jitter)
//! - [`Backoff`]       state of one retry run
//! - [`JitterPolicy`]  randomization strategy
//!
//! ## Quick wiring
//! ```text
//! Config { restart: RestartPolicy, backoff: BackoffPolicy, .. }
//!      └─► core::supervisor incident consumer uses:
//!           - restart to choose retry vs. full stop
//!           - backoff.start() / next_delay() to pace re-init attempts
//! ```
//!
//! ## Defaults
//! - `RestartPolicy::OnFailure`.
//! - `BackoffPolicy::default()` → first=1s, factor=1.5, max=60s, max_elapsed=60s, jitter=None.

mod backoff;
mod jitter;
mod restart;

pub use backoff::{Backoff, BackoffPolicy};
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;

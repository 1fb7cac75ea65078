//! # plugvisor
//!
//! **Plugvisor** is a dependency-graph lifecycle orchestrator for async Rust.
//!
//! Plugins declare what they need and what they provide. The container
//! resolves those declarations into a graph, initializes plugins in
//! dependency order, serves them, supervises their failures and stops them
//! in reverse order within a bounded time.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Plugin A   │   │   Plugin B   │   │   Plugin C   │
//!     │ (no deps)    │   │ (needs A)    │   │ (needs B)    │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Container                                                        │
//! │  - Registry  (plugins, disable reasons, per-plugin state)         │
//! │  - Graph     (arena of vertices, Init/Collect edges)              │
//! │  - Fsm       (Uninitialized → Initialized → Started → Stopped)    │
//! │  - Bus       (broadcast events) ──► SubscriberSet                 │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     init():            serve():           stop():
//!     resolve            serve in order     reverse order
//!     toposort           monitor per        shared deadline
//!     init in order      plugin ──┐         (Config::stop_timeout)
//!                                 ▼
//!                     incidents (bounded) ──► single consumer
//!                                               ├─ OnFailure ─► retry subgraph (backoff)
//!                                               └─ Never     ─► stop container
//!                                                      │
//!                                                      ▼
//!                                           ServeResult channel (caller)
//! ```
//!
//! ### Ordering
//! ```text
//! A ──► B ──► C        init:  A, B, C
//!                      serve: A, B, C
//!                      stop:  C, B, A
//! ```
//! Among plugins whose dependencies are satisfied, a lower
//! `weight / (1 + dependencies)` goes first; ties keep registration order.
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Plugins**       | Lifecycle hooks and declared capabilities.                    | [`Plugin`], [`Service`], [`Capability`]     |
//! | **Bindings**      | Lazily produced values and collector callbacks.               | [`ProviderBinding`], [`CollectorBinding`]   |
//! | **Container**     | Register, init, serve, stop; graph enumeration.               | [`Container`], [`ContainerBuilder`]         |
//! | **Policies**      | Incident handling and retry pacing.                           | [`RestartPolicy`], [`BackoffPolicy`]        |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom).        | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors tagged with the failing operation.               | [`PluginError`], [`ContainerError`], [`Op`] |
//! | **Configuration** | Centralize runtime settings.                                  | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, OnceLock};
//! use async_trait::async_trait;
//! use plugvisor::{Capability, Config, Container, Dependencies, ErrorStream, Plugin, PluginError, Service};
//!
//! struct Db;
//!
//! #[async_trait]
//! impl Plugin for Db {
//!     fn name(&self) -> &str { "db" }
//!     async fn init(&self, _deps: &Dependencies) -> Result<(), PluginError> { Ok(()) }
//! }
//!
//! #[derive(Default)]
//! struct Http { db: OnceLock<Arc<Db>> }
//!
//! #[async_trait]
//! impl Plugin for Http {
//!     fn name(&self) -> &str { "http" }
//!     fn dependencies(&self) -> Vec<Capability> { vec![Capability::of::<Db>()] }
//!     async fn init(&self, deps: &Dependencies) -> Result<(), PluginError> {
//!         let _ = self.db.set(deps.require::<Db>()?);
//!         Ok(())
//!     }
//!     fn service(&self) -> Option<&dyn Service> { Some(self) }
//! }
//!
//! #[async_trait]
//! impl Service for Http {
//!     async fn serve(&self) -> ErrorStream { ErrorStream::healthy() }
//!     async fn stop(&self) -> Result<(), PluginError> { Ok(()) }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let container = Container::builder(Config::default()).build();
//!     container.register(Http::default()).await?;
//!     container.register(Db).await?;
//!
//!     // init → serve → (shutdown future completes) → stop
//!     container.run_until(async {}).await?;
//!     assert_eq!(container.run_list().await, vec!["db", "http"]);
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod graph;
mod plugin;
mod policies;
mod state;
mod subscribers;

// ---- Public re-exports ----

pub use core::{Config, Container, ContainerBuilder, ServeResult};
pub use error::{ContainerError, Op, PluginError, StateError};
pub use events::{Event, EventKind};
pub use graph::{DisableReason, EdgeInfo, EdgeKind, VertexInfo};
pub use plugin::{
    Capability, CapabilityKind, CollectorBinding, Dependencies, ErrorSender, ErrorStream, Plugin,
    ProvideContext, ProviderBinding, Service, Value, error_channel,
};
pub use policies::{Backoff, BackoffPolicy, JitterPolicy, RestartPolicy};
pub use state::State;
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;

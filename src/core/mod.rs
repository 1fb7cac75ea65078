//! Container core: lifecycle orchestration.
//!
//! The public API of this module is [`Container`] (with [`ContainerBuilder`]),
//! its [`Config`], and the [`ServeResult`]s it reports.
//!
//! Internal modules:
//! - [`registry`]: registered plugins and their disable reasons;
//! - [`fsm`]: container state machine, serializes init/serve/stop;
//! - [`init`]: resolve, sort and initialize in dependency order;
//! - [`supervisor`]: serve in order, monitor error streams, consume incidents;
//! - [`monitor`]: one task per served plugin feeding the incident channel;
//! - [`retry`]: restart the subgraph behind a failed plugin with backoff;
//! - [`shutdown`]: bounded reverse-order stop and OS signal handling.

mod builder;
mod config;
mod container;
mod fsm;
mod init;
mod monitor;
mod registry;
mod retry;
mod shutdown;
mod supervisor;

#[cfg(test)]
mod tests;

pub use builder::ContainerBuilder;
pub use config::Config;
pub use container::Container;
pub use supervisor::ServeResult;

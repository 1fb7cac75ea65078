//! # Plugin and service contracts.
//!
//! A [`Plugin`] is any component the container manages. Only
//! [`Plugin::init`] is mandatory; everything else has a default:
//!
//! | Method          | Default            | Effect                                           |
//! |-----------------|--------------------|--------------------------------------------------|
//! | `name`          | type name          | display name in logs, events and errors          |
//! | `weight`        | `1`                | scheduling tie-break (lower ratio starts first)  |
//! | `dependencies`  | none               | capabilities resolved and passed to `init`       |
//! | `provides`      | none               | extra capabilities (the plugin's own type is implicit) |
//! | `collects`      | none               | capabilities fed to callbacks after `init`       |
//! | `service`       | `None`             | long-running part: `serve` + `stop`              |
//!
//! Plugins are shared (`Arc`) and called through `&self`; keep mutable state
//! behind interior mutability.
//!
//! # Example
//! ```
//! use std::sync::{Arc, OnceLock};
//! use async_trait::async_trait;
//! use plugvisor::{Capability, Dependencies, ErrorStream, Plugin, PluginError, Service};
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
//! ```

use async_trait::async_trait;

use crate::error::PluginError;
use crate::plugin::binding::{CollectorBinding, ProviderBinding};
use crate::plugin::capability::Capability;
use crate::plugin::deps::Dependencies;
use crate::plugin::stream::ErrorStream;

/// # A component managed by the container.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Returns a stable, human-readable plugin name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Scheduling tie-break between otherwise unordered plugins.
    fn weight(&self) -> u32 {
        1
    }

    /// Capabilities that must be initialized before this plugin and passed to [`init`](Plugin::init).
    fn dependencies(&self) -> Vec<Capability> {
        Vec::new()
    }

    /// Initializes the plugin with its resolved dependencies.
    ///
    /// Return [`PluginError::Disabled`] to opt out: the plugin and every plugin
    /// depending on it are excluded and initialization continues without them.
    async fn init(&self, deps: &Dependencies) -> Result<(), PluginError>;

    /// Capabilities this plugin manufactures for others.
    fn provides(&self) -> Vec<ProviderBinding> {
        Vec::new()
    }

    /// Capabilities this plugin wants to receive from every provider.
    fn collects(&self) -> Vec<CollectorBinding> {
        Vec::new()
    }

    /// The long-running part of the plugin, if any.
    fn service(&self) -> Option<&dyn Service> {
        None
    }
}

/// # Long-running part of a plugin.
///
/// `serve` must return promptly: the work itself runs on tasks the plugin
/// spawns, and failures are reported through the returned [`ErrorStream`].
#[async_trait]
pub trait Service: Send + Sync {
    /// Starts serving and returns the stream of asynchronous failures.
    async fn serve(&self) -> ErrorStream;

    /// Stops serving. Called in reverse start order.
    async fn stop(&self) -> Result<(), PluginError>;
}

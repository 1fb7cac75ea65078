//! # Plugin contract: capabilities, bindings and lifecycle traits.
//!
//! This module provides the types a plugin author deals with:
//! - [`Plugin`] / [`Service`] - lifecycle traits (init, serve, stop)
//! - [`Capability`] / [`Value`] - type identities and type-erased values
//! - [`ProviderBinding`] / [`CollectorBinding`] - what a plugin offers and wants
//! - [`Dependencies`] - resolved values handed to `init`
//! - [`ErrorStream`] / [`ErrorSender`] - asynchronous failure reporting

mod binding;
mod capability;
mod deps;
#[allow(clippy::module_inception)]
mod plugin;
mod stream;

pub use binding::{CollectorBinding, ProvideContext, ProviderBinding};
pub use capability::{Capability, CapabilityKind, Value};
pub use deps::Dependencies;
pub use plugin::{Plugin, Service};
pub use stream::{ErrorSender, ErrorStream, error_channel};

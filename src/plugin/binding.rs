//! # Provider and collector bindings.
//!
//! A plugin describes what it can manufacture with [`ProviderBinding`]s and what
//! it wants to be fed after its own `init` with [`CollectorBinding`]s.
//!
//! ## Provider factories
//! Factories are invoked lazily, once per requesting plugin, after the
//! providing plugin has been initialized. The [`ProvideContext`] gives the
//! factory:
//! - the requester's name (so a provider can hand out per-caller instances),
//! - the provider itself ([`ProvideContext::this`]),
//! - the values of the binding's extra arguments, taken from the requester.
//!
//! ```text
//! requester R needs T ──► provider P has bindings for T:
//!                           [T(args: A, B)]  [T(args: A)]  [T()]
//!                         pick the first whose args R satisfies,
//!                         most args first
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use plugvisor::{CollectorBinding, PluginError, ProviderBinding};
//!
//! trait Endpoint: Send + Sync {
//!     fn path(&self) -> String;
//! }
//!
//! struct Health;
//! impl Endpoint for Health {
//!     fn path(&self) -> String { "/health".into() }
//! }
//!
//! let provide = ProviderBinding::new::<dyn Endpoint, _>(|_ctx| Ok(Arc::new(Health) as Arc<dyn Endpoint>));
//! assert_eq!(provide.args().len(), 0);
//!
//! let collect = CollectorBinding::interface::<dyn Endpoint, _>(|ep, from| {
//!     println!("{from} serves {}", ep.path());
//!     Ok::<(), PluginError>(())
//! });
//! assert_eq!(collect.capability().name(), provide.capability().name());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::PluginError;
use crate::plugin::capability::{Capability, Value};
use crate::plugin::deps::Dependencies;

type Factory = Arc<dyn Fn(&ProvideContext<'_>) -> Result<Value, PluginError> + Send + Sync>;
type Callback = Arc<dyn Fn(&Value, &str) -> Result<(), PluginError> + Send + Sync>;

/// Call-site information passed to a provider factory.
pub struct ProvideContext<'a> {
    pub(crate) requester: &'a str,
    pub(crate) this: &'a Value,
    pub(crate) args: &'a Dependencies,
}

impl<'a> ProvideContext<'a> {
    /// Name of the plugin the value is produced for.
    pub fn requester(&self) -> &str {
        self.requester
    }

    /// The providing plugin itself, downcast to its concrete type.
    pub fn this<P: Send + Sync + 'static>(&self) -> Option<Arc<P>> {
        self.this.downcast::<P>()
    }

    /// Values of the binding's extra arguments, supplied by the requester.
    pub fn args(&self) -> &Dependencies {
        self.args
    }
}

/// A capability a plugin can manufacture.
#[derive(Clone)]
pub struct ProviderBinding {
    capability: Capability,
    args: Vec<Capability>,
    factory: Factory,
}

impl ProviderBinding {
    /// Declares that the plugin provides `T` through `factory`.
    pub fn new<T, F>(factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ProvideContext<'_>) -> Result<Arc<T>, PluginError> + Send + Sync + 'static,
    {
        Self {
            capability: Capability::of_dyn::<T>(),
            args: Vec::new(),
            factory: Arc::new(move |ctx: &ProvideContext<'_>| factory(ctx).map(Value::new::<T>)),
        }
    }

    /// Declares extra arguments the requester must supply for this binding.
    pub fn with_args(mut self, args: impl IntoIterator<Item = Capability>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    #[inline]
    pub fn capability(&self) -> Capability {
        self.capability
    }

    #[inline]
    pub fn args(&self) -> &[Capability] {
        &self.args
    }

    pub(crate) fn produce(&self, ctx: &ProvideContext<'_>) -> Result<Value, PluginError> {
        (self.factory)(ctx)
    }
}

impl fmt::Debug for ProviderBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBinding")
            .field("capability", &self.capability)
            .field("args", &self.args)
            .finish()
    }
}

/// A capability a plugin wants to receive from every plugin providing it.
#[derive(Clone)]
pub struct CollectorBinding {
    capability: Capability,
    callback: Callback,
}

impl CollectorBinding {
    /// Collects an interface: `callback` runs once per providing plugin.
    pub fn interface<T, F>(callback: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>, &str) -> Result<(), PluginError> + Send + Sync + 'static,
    {
        Self::with_capability::<T, F>(Capability::of_dyn::<T>(), callback)
    }

    /// Collects a concrete type: exactly one plugin must provide it.
    pub fn concrete<T, F>(callback: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, &str) -> Result<(), PluginError> + Send + Sync + 'static,
    {
        Self::with_capability::<T, F>(Capability::of::<T>(), callback)
    }

    fn with_capability<T, F>(capability: Capability, callback: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>, &str) -> Result<(), PluginError> + Send + Sync + 'static,
    {
        Self {
            capability,
            callback: Arc::new(move |value: &Value, provider: &str| match value.downcast::<T>() {
                Some(v) => callback(v, provider),
                None => Err(PluginError::fatal(format!(
                    "provider {provider} produced {} instead of {}",
                    value.capability(),
                    std::any::type_name::<T>()
                ))),
            }),
        }
    }

    #[inline]
    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub(crate) fn collect(&self, value: &Value, provider: &str) -> Result<(), PluginError> {
        (self.callback)(value, provider)
    }
}

impl fmt::Debug for CollectorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorBinding")
            .field("capability", &self.capability)
            .finish()
    }
}

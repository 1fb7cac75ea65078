//! # Capability tokens and type-erased values.
//!
//! A [`Capability`] names a type a plugin needs, provides or collects. It is the
//! explicit replacement for inspecting method signatures: the resolver matches
//! capabilities by [`TypeId`].
//!
//! - [`Capability::of`] names a **concrete** type (for example another plugin).
//!   Exactly one provider is expected.
//! - [`Capability::of_dyn`] names an **interface** (`dyn Trait`). Any number of
//!   plugins may provide it; collectors fan out over all of them.
//!
//! A [`Value`] is an `Arc<T>` with the `T` erased, so that `Arc<dyn Trait>` and
//! `Arc<ConcretePlugin>` travel through the same tables.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use plugvisor::{Capability, Value};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String { "hello".into() }
//! }
//!
//! let v = Value::new::<dyn Greeter>(Arc::new(English));
//! assert_eq!(v.capability(), Capability::of_dyn::<dyn Greeter>());
//! assert_eq!(v.downcast::<dyn Greeter>().map(|g| g.greet()), Some("hello".to_string()));
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Whether a capability names a concrete type or an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    /// Exactly one provider must exist.
    Concrete,
    /// Zero or more providers; collectors fan out.
    Interface,
}

/// Type identity used for dependency resolution.
///
/// Equality and hashing use the [`TypeId`] only; the kind and name are
/// descriptive.
#[derive(Clone, Copy)]
pub struct Capability {
    id: TypeId,
    name: &'static str,
    kind: CapabilityKind,
}

impl Capability {
    /// Names a concrete type.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind: CapabilityKind::Concrete,
        }
    }

    /// Names an interface, usually `dyn Trait`.
    pub fn of_dyn<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind: CapabilityKind::Interface,
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// True for scalar and string types, which are never valid capabilities.
    pub fn is_primitive(&self) -> bool {
        primitive_type_ids().contains(&self.id)
    }
}

fn primitive_type_ids() -> [TypeId; 20] {
    [
        TypeId::of::<()>(),
        TypeId::of::<bool>(),
        TypeId::of::<char>(),
        TypeId::of::<i8>(),
        TypeId::of::<i16>(),
        TypeId::of::<i32>(),
        TypeId::of::<i64>(),
        TypeId::of::<i128>(),
        TypeId::of::<isize>(),
        TypeId::of::<u8>(),
        TypeId::of::<u16>(),
        TypeId::of::<u32>(),
        TypeId::of::<u64>(),
        TypeId::of::<u128>(),
        TypeId::of::<usize>(),
        TypeId::of::<f32>(),
        TypeId::of::<f64>(),
        TypeId::of::<str>(),
        TypeId::of::<String>(),
        TypeId::of::<&'static str>(),
    ]
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.name).finish()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Type-erased `Arc<T>` tagged with its [`Capability`].
#[derive(Clone)]
pub struct Value {
    capability: Capability,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Value {
    /// Erases `value`. `T` may be unsized (`dyn Trait`).
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            capability: Capability::of_dyn::<T>(),
            inner: Arc::new(value),
        }
    }

    #[inline]
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Recovers the original `Arc<T>`; `None` if `T` is not the erased type.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.downcast_ref::<Arc<T>>().cloned()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value").field("capability", &self.capability).finish()
    }
}

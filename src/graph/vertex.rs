use std::any::TypeId;
use std::sync::Arc;

use crate::graph::{DisableReason, ProviderRef, VertexId};
use crate::plugin::{Capability, CollectorBinding, Plugin, ProviderBinding, Value};
use crate::state::AtomicState;

/// DFS color used by the topological sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// A registered plugin and its graph metadata.
pub(crate) struct Vertex {
    pub(crate) id: VertexId,
    pub(crate) name: Arc<str>,
    pub(crate) type_id: TypeId,
    pub(crate) plugin: Arc<dyn Plugin>,
    /// The plugin itself as a provided value of its own concrete type.
    pub(crate) this: Value,
    pub(crate) state: Arc<AtomicState>,
    pub(crate) weight: u32,

    pub(crate) wants: Vec<Capability>,
    pub(crate) provides: Vec<ProviderBinding>,
    pub(crate) collects: Vec<CollectorBinding>,

    pub(crate) disabled: Option<DisableReason>,
    /// Distinct vertices that must be initialized first.
    pub(crate) dependencies: Vec<VertexId>,
    pub(crate) dependents: Vec<VertexId>,
    /// Resolved `wants`, in declaration order.
    pub(crate) init_sources: Vec<(Capability, ProviderRef)>,
    /// `(collector index, provider)` pairs.
    pub(crate) collect_sources: Vec<(usize, ProviderRef)>,

    /// Dependencies not yet initialized.
    pub(crate) pending: usize,
    pub(crate) mark: Mark,
}

impl Vertex {
    pub(crate) fn new(
        id: VertexId,
        name: Arc<str>,
        plugin: Arc<dyn Plugin>,
        this: Value,
        state: Arc<AtomicState>,
        disabled: Option<DisableReason>,
    ) -> Self {
        Self {
            id,
            name,
            type_id: this.capability().type_id(),
            weight: plugin.weight(),
            wants: plugin.dependencies(),
            provides: plugin.provides(),
            collects: plugin.collects(),
            plugin,
            this,
            state,
            disabled,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            init_sources: Vec::new(),
            collect_sources: Vec::new(),
            pending: 0,
            mark: Mark::Unvisited,
        }
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.disabled.is_none()
    }

    /// Scheduling priority: lower values start earlier.
    pub(crate) fn sort_key(&self) -> f64 {
        f64::from(self.weight) / (1 + self.dependencies.len()) as f64
    }

    /// Whether this vertex can hand `cap` to a provider binding that takes it as an argument.
    pub(crate) fn can_supply(&self, cap: Capability) -> bool {
        self.type_id == cap.type_id()
            || self
                .provides
                .iter()
                .any(|b| b.capability() == cap && b.args().is_empty())
    }
}

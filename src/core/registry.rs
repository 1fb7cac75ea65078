//! # Plugin registry.
//!
//! Keeps every registered plugin, in registration order, for the lifetime of
//! the container. The graph is rebuilt from the registry on every `init`.
//!
//! ## Rules
//! - One registration per concrete plugin type.
//! - Declared capabilities must not be primitive types.
//! - A disabled plugin stays registered (with its [`DisableReason`]) so it can
//!   still be inspected.
//! - Per-plugin state cells live here and are shared with the graph, so state
//!   survives graph rebuilds.

use std::sync::Arc;

use crate::error::ContainerError;
use crate::events::{Bus, Event, EventKind};
use crate::graph::{DisableReason, Graph, VertexId, VertexInfo};
use crate::plugin::{Capability, Plugin, Value};
use crate::state::{AtomicState, State};

/// One registered plugin.
pub(crate) struct Registration {
    pub(crate) name: Arc<str>,
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) this: Value,
    pub(crate) state: Arc<AtomicState>,
    pub(crate) disabled: Option<DisableReason>,
}

/// Registered plugins in registration order.
pub(crate) struct Registry {
    entries: Vec<Registration>,
    bus: Bus,
}

impl Registry {
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            entries: Vec::new(),
            bus,
        }
    }

    /// Validates and stores a plugin.
    pub(crate) fn register<P: Plugin>(&mut self, plugin: Arc<P>) -> Result<(), ContainerError> {
        let this = Value::new(Arc::clone(&plugin));
        let name: Arc<str> = Arc::from(plugin.name());

        if self
            .entries
            .iter()
            .any(|e| e.this.capability() == this.capability())
        {
            return Err(ContainerError::AlreadyRegistered {
                plugin: name.to_string(),
            });
        }
        if let Some(cap) = declared(plugin.as_ref()).find(Capability::is_primitive) {
            return Err(ContainerError::PrimitiveCapability {
                plugin: name.to_string(),
                capability: cap.name(),
            });
        }

        tracing::debug!(plugin = %name, "plugin registered");
        self.bus
            .publish(Event::new(EventKind::PluginRegistered).with_plugin(Arc::clone(&name)));
        self.entries.push(Registration {
            name,
            plugin,
            this,
            state: Arc::new(AtomicState::default()),
            disabled: None,
        });
        Ok(())
    }

    /// First registration named `name`. Names need not be unique.
    pub(crate) fn find(&self, name: &str) -> Option<&Registration> {
        self.entries.iter().find(|e| &*e.name == name)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records why the plugin at `index` (its vertex id in every graph built
    /// by [`build_graph`](Self::build_graph)) was excluded. Returns `false` if
    /// it already was.
    pub(crate) fn disable(&mut self, index: VertexId, reason: DisableReason) -> bool {
        let Some(entry) = self.entries.get_mut(index.index()) else {
            return false;
        };
        if entry.disabled.is_some() {
            return false;
        }
        tracing::info!(plugin = %entry.name, %reason, "plugin disabled");
        self.bus.publish(
            Event::new(EventKind::PluginDisabled)
                .with_plugin(Arc::clone(&entry.name))
                .with_reason(reason.to_string()),
        );
        entry.disabled = Some(reason);
        true
    }

    /// Forgets every disable reason and rewinds every state to `Uninitialized`.
    pub(crate) fn reset(&mut self) {
        for e in &mut self.entries {
            e.disabled = None;
            e.state.reset();
        }
    }

    /// Builds a fresh graph holding every registration (disabled ones included),
    /// in registration order.
    pub(crate) fn build_graph(&self) -> Graph {
        let mut graph = Graph::new();
        for e in &self.entries {
            graph.add_vertex(
                Arc::clone(&e.name),
                Arc::clone(&e.plugin),
                e.this.clone(),
                Arc::clone(&e.state),
                e.disabled.clone(),
            );
        }
        graph
    }

    /// Copies disable reasons found by the resolver back into the registry.
    pub(crate) fn absorb(&mut self, graph: &Graph) {
        for (idx, info) in graph.info().into_iter().enumerate() {
            if let Some(reason) = info.disabled {
                self.disable(VertexId(idx), reason);
            }
        }
    }

    /// Snapshot used before the first `init` (no edges yet).
    pub(crate) fn info(&self) -> Vec<VertexInfo> {
        self.entries
            .iter()
            .map(|e| VertexInfo {
                name: e.name.to_string(),
                state: e.state.load(),
                weight: e.plugin.weight(),
                disabled: e.disabled.clone(),
                dependencies: Vec::new(),
            })
            .collect()
    }

    pub(crate) fn state_of(&self, name: &str) -> Option<State> {
        self.find(name).map(|e| e.state.load())
    }
}

/// Every capability a plugin declares: dependencies, provided types and
/// their arguments, collected types.
fn declared(plugin: &dyn Plugin) -> impl Iterator<Item = Capability> {
    let mut caps = plugin.dependencies();
    for b in plugin.provides() {
        caps.push(b.capability());
        caps.extend_from_slice(b.args());
    }
    caps.extend(plugin.collects().iter().map(|c| c.capability()));
    caps.into_iter()
}

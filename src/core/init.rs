//! # Initialization walk.
//!
//! ```text
//! registry.reset()
//! loop:
//!   graph = registry.build_graph() ─► resolve() ─► sort(enabled)
//!   for v in order:
//!     v already Initialized?  skip (kept from a previous pass)
//!     init_vertex(v):
//!       Disabled ─► registry.disable(v), rebuild (restart the loop)
//!       Err      ─► abort
//!     mark_initialized(v)       (dependents' pending--)
//! ```
//!
//! A plugin is only initialized once per `Container::init`: when an opt-out
//! forces a rebuild, plugins initialized by an earlier pass are not re-run.

use std::sync::Arc;

use crate::core::container::Inner;
use crate::error::{ContainerError, Op, PluginError};
use crate::events::{Event, EventKind};
use crate::graph::{DisableReason, Graph, VertexId};
use crate::plugin::{CollectorBinding, Dependencies, Plugin, Value};
use crate::state::{AtomicState, State};

/// Everything `init_vertex` needs, gathered under the graph read lock.
struct Prepared {
    name: Arc<str>,
    plugin: Arc<dyn Plugin>,
    state: Arc<AtomicState>,
    deps: Dependencies,
    collected: Vec<Collected>,
}

struct Collected {
    binding: CollectorBinding,
    provider: Arc<str>,
    value: Value,
}

pub(crate) async fn initialize(inner: &Inner) -> Result<(), ContainerError> {
    {
        let mut registry = inner.registry.write().await;
        if registry.is_empty() {
            return Err(ContainerError::NoPlugins);
        }
        registry.reset();
    }

    loop {
        let order = {
            let mut registry = inner.registry.write().await;
            let mut graph = registry.build_graph();
            graph.resolve()?;
            registry.absorb(&graph);

            let enabled = graph.enabled();
            if enabled.is_empty() {
                return Err(ContainerError::NoPlugins);
            }
            let order = graph.sort(&enabled)?;
            *inner.graph.write().await = graph;
            order
        };
        *inner.run_list.write().await = order.clone();
        tracing::info!(plugins = order.len(), "initializing plugins");

        match walk(inner, &order).await? {
            None => return Ok(()),
            Some(id) => {
                inner
                    .registry
                    .write()
                    .await
                    .disable(id, DisableReason::OptedOut);
            }
        }
    }
}

/// Initializes `order` one vertex at a time. Returns the vertex that opted out, if any.
async fn walk(inner: &Inner, order: &[VertexId]) -> Result<Option<VertexId>, ContainerError> {
    for &id in order {
        let state = Arc::clone(&inner.graph.read().await.vertex(id).state);

        if state.load() != State::Initialized {
            match init_vertex(inner, id, Op::Init, None).await {
                Ok(()) => {}
                Err(ContainerError::Init {
                    source: PluginError::Disabled,
                    ..
                }) => return Ok(Some(id)),
                Err(e) => return Err(e),
            }
        }
        inner.graph.write().await.mark_initialized(id);
    }
    Ok(None)
}

/// Runs `Plugin::init` for one vertex, then feeds its collectors.
///
/// The caller decrements the dependents' pending counters on success.
/// `Disabled` comes back as `ContainerError::Init` with the vertex state rewound.
pub(crate) async fn init_vertex(
    inner: &Inner,
    id: VertexId,
    op: Op,
    attempt: Option<u32>,
) -> Result<(), ContainerError> {
    let Prepared {
        name,
        plugin,
        state,
        deps,
        collected,
    } = {
        let graph = inner.graph.read().await;
        prepare(&graph, id, op)?
    };

    state.store(State::Initializing);
    let mut ev = Event::new(EventKind::PluginInitializing).with_plugin(Arc::clone(&name));
    if let Some(n) = attempt {
        ev = ev.with_attempt(n);
    }
    inner.bus.publish(ev);
    tracing::debug!(plugin = %name, %op, deps = deps.len(), "initializing plugin");

    if let Err(source) = plugin.init(&deps).await {
        if source == PluginError::Disabled {
            state.reset();
            tracing::info!(plugin = %name, "plugin opted out during init");
        } else {
            state.store(State::Error);
            tracing::warn!(plugin = %name, %op, error = %source, "plugin init failed");
        }
        return Err(ContainerError::Init {
            op,
            plugin: name.to_string(),
            source,
        });
    }

    for c in collected {
        if let Err(source) = c.binding.collect(&c.value, &c.provider) {
            state.store(State::Error);
            tracing::warn!(plugin = %name, provider = %c.provider, error = %source, "collector failed");
            return Err(ContainerError::Collect {
                op,
                plugin: name.to_string(),
                provider: c.provider.to_string(),
                source,
            });
        }
    }

    state.store(State::Initialized);
    tracing::info!(plugin = %name, "plugin initialized");
    inner
        .bus
        .publish(Event::new(EventKind::PluginInitialized).with_plugin(name));
    Ok(())
}

fn prepare(graph: &Graph, id: VertexId, op: Op) -> Result<Prepared, ContainerError> {
    let v = graph.vertex(id);
    if v.pending > 0 {
        return Err(ContainerError::DependencyNotReady {
            op,
            plugin: v.name.to_string(),
            pending: v.pending,
        });
    }

    let mut deps = Dependencies::new();
    for (wanted, source) in &v.init_sources {
        let provider = Arc::clone(&graph.vertex(source.vertex).name);
        let value = graph
            .produce(*source, id)
            .map_err(|source| ContainerError::Init {
                op,
                plugin: v.name.to_string(),
                source,
            })?;
        deps.push(*wanted, provider, value);
    }

    let mut collected = Vec::with_capacity(v.collect_sources.len());
    for (slot, source) in &v.collect_sources {
        let provider = Arc::clone(&graph.vertex(source.vertex).name);
        let value = graph
            .produce(*source, id)
            .map_err(|e| ContainerError::Collect {
                op,
                plugin: v.name.to_string(),
                provider: provider.to_string(),
                source: e,
            })?;
        collected.push(Collected {
            binding: v.collects[*slot].clone(),
            provider,
            value,
        });
    }

    Ok(Prepared {
        name: Arc::clone(&v.name),
        plugin: Arc::clone(&v.plugin),
        state: Arc::clone(&v.state),
        deps,
        collected,
    })
}

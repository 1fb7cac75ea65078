use std::any::TypeId;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::PluginError;
use crate::graph::vertex::{Mark, Vertex};
use crate::graph::{DisableReason, EdgeInfo, EdgeKind, VertexId, VertexInfo};
use crate::plugin::{Capability, Dependencies, Plugin, ProvideContext, Value};
use crate::state::AtomicState;

/// Which value of a provider vertex satisfies a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// The plugin itself.
    This,
    /// `Plugin::provides()[i]`.
    Index(usize),
}

/// A producing vertex together with the binding to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProviderRef {
    pub(crate) vertex: VertexId,
    pub(crate) binding: Binding,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub(crate) from: VertexId,
    pub(crate) to: VertexId,
    pub(crate) kind: EdgeKind,
    pub(crate) capability: Capability,
}

/// Arena of vertices plus the provides table.
#[derive(Default)]
pub(crate) struct Graph {
    pub(super) vertices: Vec<Vertex>,
    pub(super) edges: Vec<Edge>,
    /// Provided type → every binding producing it, in registration order.
    pub(super) provides: HashMap<TypeId, Vec<ProviderRef>>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_vertex(
        &mut self,
        name: Arc<str>,
        plugin: Arc<dyn Plugin>,
        this: Value,
        state: Arc<AtomicState>,
        disabled: Option<DisableReason>,
    ) -> VertexId {
        let id = VertexId(self.vertices.len());
        let vertex = Vertex::new(id, name, plugin, this, state, disabled);

        self.provides
            .entry(vertex.type_id)
            .or_default()
            .push(ProviderRef {
                vertex: id,
                binding: Binding::This,
            });
        for (i, binding) in vertex.provides.iter().enumerate() {
            self.provides
                .entry(binding.capability().type_id())
                .or_default()
                .push(ProviderRef {
                    vertex: id,
                    binding: Binding::Index(i),
                });
        }
        self.vertices.push(vertex);
        id
    }

    #[inline]
    pub(crate) fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id.0]
    }

    /// True if `id` exists and is not disabled.
    pub(crate) fn has_vertex(&self, id: VertexId) -> bool {
        self.vertices.get(id.0).is_some_and(Vertex::is_enabled)
    }

    /// Distinct enabled vertices providing `type_id`, in registration order.
    pub(crate) fn find_provider(&self, type_id: TypeId) -> Vec<VertexId> {
        let mut out: Vec<VertexId> = Vec::new();
        for r in self.provider_refs(type_id) {
            if self.has_vertex(r.vertex) && !out.contains(&r.vertex) {
                out.push(r.vertex);
            }
        }
        out
    }

    pub(crate) fn provider_refs(&self, type_id: TypeId) -> &[ProviderRef] {
        self.provides.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn enabled(&self) -> Vec<VertexId> {
        self.vertices
            .iter()
            .filter(|v| v.is_enabled())
            .map(|v| v.id)
            .collect()
    }

    /// Inserts `from → to`. Self-loops are ignored; parallel edges keep one
    /// dependency entry.
    pub(crate) fn add_edge(&mut self, from: VertexId, to: VertexId, kind: EdgeKind, capability: Capability) {
        if from == to {
            return;
        }
        self.edges.push(Edge {
            from,
            to,
            kind,
            capability,
        });
        if !self.vertices[to.0].dependencies.contains(&from) {
            self.vertices[to.0].dependencies.push(from);
            self.vertices[from.0].dependents.push(to);
        }
    }

    /// Disables `id` and, transitively along `Init` edges, everything that
    /// needs it. Returns the newly disabled vertices.
    ///
    /// An already disabled root keeps its reason but still cascades.
    pub(crate) fn remove_vertex(&mut self, id: VertexId, reason: DisableReason) -> Vec<VertexId> {
        let mut removed = Vec::new();
        let mut stack = vec![(id, reason)];

        while let Some((v, why)) = stack.pop() {
            let vertex = &mut self.vertices[v.0];
            if vertex.disabled.is_none() {
                vertex.disabled = Some(why);
                removed.push(v);
            } else if v != id {
                continue;
            }

            let name = self.vertices[v.0].name.to_string();
            for e in &self.edges {
                if e.from == v && e.kind == EdgeKind::Init && self.vertices[e.to.0].is_enabled() {
                    stack.push((
                        e.to,
                        DisableReason::DependencyDisabled {
                            dependency: name.clone(),
                        },
                    ));
                }
            }
        }
        removed
    }

    /// Picks the binding of `provider` that satisfies `wanted` for `requester`.
    ///
    /// The provider's own type wins; otherwise bindings are tried largest
    /// argument list first and the first one whose arguments the requester
    /// can supply is taken.
    pub(crate) fn select_binding(
        &self,
        provider: VertexId,
        wanted: Capability,
        requester: VertexId,
    ) -> Option<ProviderRef> {
        let p = self.vertex(provider);
        if p.type_id == wanted.type_id() {
            return Some(ProviderRef {
                vertex: provider,
                binding: Binding::This,
            });
        }

        let r = self.vertex(requester);
        let mut bindings: Vec<usize> = p
            .provides
            .iter()
            .enumerate()
            .filter(|(_, b)| b.capability() == wanted)
            .map(|(i, _)| i)
            .collect();
        bindings.sort_by_key(|&i| Reverse(p.provides[i].args().len()));

        bindings
            .into_iter()
            .find(|&i| p.provides[i].args().iter().all(|a| r.can_supply(*a)))
            .map(|i| ProviderRef {
                vertex: provider,
                binding: Binding::Index(i),
            })
    }

    /// Produces the value `source` hands to `requester`.
    pub(crate) fn produce(&self, source: ProviderRef, requester: VertexId) -> Result<Value, PluginError> {
        let p = self.vertex(source.vertex);
        let binding = match source.binding {
            Binding::This => return Ok(p.this.clone()),
            Binding::Index(i) => &p.provides[i],
        };

        let r = self.vertex(requester);
        let mut args = Dependencies::new();
        for cap in binding.args() {
            args.push(*cap, r.name.clone(), supply(r, *cap)?);
        }
        binding.produce(&ProvideContext {
            requester: &r.name,
            this: &p.this,
            args: &args,
        })
    }

    /// Decrements the pending counter of every dependent of `id`.
    pub(crate) fn mark_initialized(&mut self, id: VertexId) {
        let dependents = self.vertices[id.0].dependents.clone();
        for d in dependents {
            let v = &mut self.vertices[d.0];
            v.pending = v.pending.saturating_sub(1);
        }
    }

    /// Sets every enabled vertex's pending counter to its dependency count.
    pub(crate) fn reset_pending(&mut self) {
        let enabled: Vec<bool> = self.vertices.iter().map(Vertex::is_enabled).collect();
        for v in &mut self.vertices {
            v.pending = v.dependencies.iter().filter(|d| enabled[d.0]).count();
            v.mark = Mark::Unvisited;
        }
    }

    /// Collects `root` and its transitive enabled dependents (discovery order)
    /// and rewinds their pending counters to the dependencies inside that set.
    ///
    /// Edges and the states of unaffected vertices are left untouched.
    pub(crate) fn reset_subgraph(&mut self, root: VertexId) -> Vec<VertexId> {
        let mut affected = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];

        while let Some(v) = stack.pop() {
            if !seen.insert(v) || !self.has_vertex(v) {
                continue;
            }
            affected.push(v);
            for d in self.vertices[v.0].dependents.iter().rev() {
                if !seen.contains(d) {
                    stack.push(*d);
                }
            }
        }

        for &v in &affected {
            let vertex = &mut self.vertices[v.0];
            vertex.pending = vertex.dependencies.iter().filter(|d| seen.contains(d)).count();
            vertex.mark = Mark::Unvisited;
        }
        affected
    }

    pub(crate) fn info(&self) -> Vec<VertexInfo> {
        self.vertices
            .iter()
            .map(|v| VertexInfo {
                name: v.name.to_string(),
                state: v.state.load(),
                weight: v.weight,
                disabled: v.disabled.clone(),
                dependencies: v
                    .dependencies
                    .iter()
                    .map(|d| self.vertices[d.0].name.to_string())
                    .collect(),
            })
            .collect()
    }

    pub(crate) fn edge_info(&self) -> Vec<EdgeInfo> {
        self.edges
            .iter()
            .map(|e| EdgeInfo {
                from: self.vertices[e.from.0].name.to_string(),
                to: self.vertices[e.to.0].name.to_string(),
                kind: e.kind,
                capability: e.capability.name(),
            })
            .collect()
    }
}

/// Value the requester passes as a provider argument: itself, or one of its
/// argument-free provided values.
fn supply(requester: &Vertex, cap: Capability) -> Result<Value, PluginError> {
    if requester.type_id == cap.type_id() {
        return Ok(requester.this.clone());
    }
    let no_args = Dependencies::new();
    match requester
        .provides
        .iter()
        .find(|b| b.capability() == cap && b.args().is_empty())
    {
        Some(b) => b.produce(&ProvideContext {
            requester: &requester.name,
            this: &requester.this,
            args: &no_args,
        }),
        None => Err(PluginError::fatal(format!(
            "{} cannot supply provider argument {cap}",
            requester.name
        ))),
    }
}

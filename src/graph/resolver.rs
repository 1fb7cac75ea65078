//! # Resolver: declared needs → edges.
//!
//! Runs once per `Container::init`, on a freshly built graph.
//!
//! 1. **Dependencies** (`Plugin::dependencies`). Each wanted capability is
//!    looked up in the provides table. No provider → the requester is
//!    disabled (not an error). A concrete type with several providers is
//!    ambiguous (fatal); an interface takes the first provider in
//!    registration order.
//! 2. **Cascade**. Every disabled vertex disables its dependents along `Init`
//!    edges.
//! 3. **Collectors** (`Plugin::collects`). An interface fans out to every
//!    enabled provider; a concrete type needs exactly one.
//! 4. **Pending counters** are set for the init walk.

use crate::error::ContainerError;
use crate::graph::{DisableReason, EdgeKind, Graph, ProviderRef, VertexId};
use crate::plugin::{Capability, CapabilityKind};

impl Graph {
    pub(crate) fn resolve(&mut self) -> Result<(), ContainerError> {
        self.resolve_dependencies()?;
        self.cascade_disabled();
        self.resolve_collectors()?;
        self.reset_pending();
        Ok(())
    }

    fn resolve_dependencies(&mut self) -> Result<(), ContainerError> {
        for idx in 0..self.vertices.len() {
            let id = VertexId(idx);
            if !self.vertices[idx].is_enabled() {
                continue;
            }

            let wants = self.vertices[idx].wants.clone();
            for wanted in wants {
                let mut found = self.candidates(id, wanted);
                if found.iter().any(|r| self.has_vertex(r.vertex)) {
                    found.retain(|r| self.has_vertex(r.vertex));
                }

                let source = match found.as_slice() {
                    [] => {
                        tracing::warn!(
                            plugin = %self.vertices[idx].name,
                            capability = wanted.name(),
                            "no provider for dependency; disabling plugin"
                        );
                        self.remove_vertex(
                            id,
                            DisableReason::MissingDependency {
                                capability: wanted.name(),
                            },
                        );
                        break;
                    }
                    [only] => *only,
                    [first, ..] if wanted.kind() == CapabilityKind::Interface => {
                        tracing::debug!(
                            plugin = %self.vertices[idx].name,
                            capability = wanted.name(),
                            provider = %self.vertices[first.vertex.0].name,
                            candidates = found.len(),
                            "several providers; using the first registered"
                        );
                        *first
                    }
                    _ => {
                        return Err(ContainerError::AmbiguousProvider {
                            plugin: self.vertices[idx].name.to_string(),
                            capability: wanted.name(),
                            candidates: self.names(&found),
                        });
                    }
                };
                self.add_edge(source.vertex, id, EdgeKind::Init, wanted);
                self.vertices[idx].init_sources.push((wanted, source));
            }
        }
        Ok(())
    }

    fn cascade_disabled(&mut self) {
        for idx in 0..self.vertices.len() {
            if let Some(reason) = self.vertices[idx].disabled.clone() {
                for removed in self.remove_vertex(VertexId(idx), reason) {
                    tracing::info!(
                        plugin = %self.vertices[removed.0].name,
                        reason = ?self.vertices[removed.0].disabled,
                        "plugin excluded"
                    );
                }
            }
        }
    }

    fn resolve_collectors(&mut self) -> Result<(), ContainerError> {
        for idx in 0..self.vertices.len() {
            let id = VertexId(idx);
            if !self.vertices[idx].is_enabled() {
                continue;
            }

            let wanted: Vec<(usize, Capability)> = self.vertices[idx]
                .collects
                .iter()
                .enumerate()
                .map(|(i, c)| (i, c.capability()))
                .collect();
            for (slot, cap) in wanted {
                let mut found = self.candidates(id, cap);
                found.retain(|r| self.has_vertex(r.vertex));

                if cap.kind() == CapabilityKind::Concrete && found.len() != 1 {
                    let plugin = self.vertices[idx].name.to_string();
                    return Err(if found.is_empty() {
                        ContainerError::UnresolvedCollector {
                            plugin,
                            capability: cap.name(),
                        }
                    } else {
                        ContainerError::AmbiguousProvider {
                            plugin,
                            capability: cap.name(),
                            candidates: self.names(&found),
                        }
                    });
                }
                for source in found {
                    self.add_edge(source.vertex, id, EdgeKind::Collect, cap);
                    self.vertices[idx].collect_sources.push((slot, source));
                }
            }
        }
        Ok(())
    }

    /// One binding per distinct provider vertex (excluding the requester).
    fn candidates(&self, requester: VertexId, wanted: Capability) -> Vec<ProviderRef> {
        let mut out: Vec<ProviderRef> = Vec::new();
        for r in self.provider_refs(wanted.type_id()) {
            if r.vertex == requester || out.iter().any(|o| o.vertex == r.vertex) {
                continue;
            }
            if let Some(pick) = self.select_binding(r.vertex, wanted, requester) {
                out.push(pick);
            }
        }
        out
    }

    fn names(&self, refs: &[ProviderRef]) -> Vec<String> {
        refs.iter()
            .map(|r| self.vertices[r.vertex.0].name.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::graph::tests::{A, B, C, D, Stub, add};
    use crate::graph::graph::{Binding, ProviderRef};
    use crate::plugin::ProviderBinding;

    trait Sink: Send + Sync {}
    impl Sink for String {}

    #[test]
    fn missing_dependency_disables_requester_and_dependents() {
        let mut g = Graph::new();
        let mut b = Stub::new("b");
        b.wants = vec![Capability::of::<D>()];
        let b = add(&mut g, b, B);
        let mut c = Stub::new("c");
        c.wants = vec![Capability::of::<B>()];
        let c = add(&mut g, c, C);
        let a = add(&mut g, Stub::new("a"), A);

        g.resolve().expect("resolves");
        assert!(matches!(
            g.vertex(b).disabled,
            Some(DisableReason::MissingDependency { .. })
        ));
        assert!(matches!(
            g.vertex(c).disabled,
            Some(DisableReason::DependencyDisabled { .. })
        ));
        assert_eq!(g.enabled(), vec![a]);
    }

    #[test]
    fn concrete_dependency_with_two_providers_is_ambiguous() {
        let mut g = Graph::new();
        for (name, marker) in [("p1", 1u8), ("p2", 2u8)] {
            let mut p = Stub::new(name);
            p.provides = vec![ProviderBinding::new::<C, _>(|_| Ok(Arc::new(C)))];
            add(&mut g, p, (marker, name));
        }
        let mut r = Stub::new("r");
        r.wants = vec![Capability::of::<C>()];
        add(&mut g, r, A);

        match g.resolve() {
            Err(ContainerError::AmbiguousProvider { candidates, .. }) => {
                assert_eq!(candidates, vec!["p1".to_string(), "p2".to_string()]);
            }
            _ => panic!("expected ambiguity"),
        }
    }

    #[test]
    fn interface_dependency_takes_first_provider() {
        let mut g = Graph::new();
        let mut p1 = Stub::new("p1");
        p1.provides = vec![ProviderBinding::new::<dyn Sink, _>(|_| {
            Ok(Arc::new("p1".to_string()) as Arc<dyn Sink>)
        })];
        let p1 = add(&mut g, p1, A);
        let mut p2 = Stub::new("p2");
        p2.provides = vec![ProviderBinding::new::<dyn Sink, _>(|_| {
            Ok(Arc::new("p2".to_string()) as Arc<dyn Sink>)
        })];
        add(&mut g, p2, B);
        let mut r = Stub::new("r");
        r.wants = vec![Capability::of_dyn::<dyn Sink>()];
        let r = add(&mut g, r, C);

        g.resolve().expect("resolves");
        assert_eq!(g.vertex(r).dependencies, vec![p1]);
        assert_eq!(g.vertex(r).pending, 1);
    }

    /// Implementation-defined: among a provider's bindings for one type, the
    /// one with the most arguments the requester can supply is used.
    #[test]
    fn provider_binding_with_most_satisfied_args_wins() {
        let mut g = Graph::new();
        let mut p = Stub::new("p");
        p.provides = vec![
            ProviderBinding::new::<C, _>(|_| Ok(Arc::new(C))),
            ProviderBinding::new::<C, _>(|_| Ok(Arc::new(C))).with_args([Capability::of::<D>()]),
            ProviderBinding::new::<C, _>(|_| Ok(Arc::new(C)))
                .with_args([Capability::of::<D>(), Capability::of::<B>()]),
        ];
        let p = add(&mut g, p, A);
        let mut r = Stub::new("r");
        r.wants = vec![Capability::of::<C>()];
        let r = add(&mut g, r, D);

        g.resolve().expect("resolves");
        assert_eq!(
            g.vertex(r).init_sources,
            vec![(
                Capability::of::<C>(),
                ProviderRef {
                    vertex: p,
                    binding: Binding::Index(1),
                }
            )]
        );
    }
}

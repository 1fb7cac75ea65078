//! # Topological scheduler.
//!
//! Classic DFS with three-color marking. Edges run from a dependency to its
//! dependents, so the reverse of the finish order puts every dependency before
//! the plugins that need it.
//!
//! ## Tie-break
//! Roots (and the dependents of a vertex) are visited in **descending** order
//! of `weight / (1 + dependencies)`, later registrations first among equals.
//! Reversing the finish order then yields lower ratios, and among equal ratios
//! earlier registrations, first.
//!
//! ```text
//! a (w=1, 0 deps)  key 1.0        visit: a → b → c        finish: c b a
//! b (w=1, 1 dep)   key 0.5                                 order:  a b c
//! c (w=1, 1 dep)   key 0.5
//! ```

use std::collections::HashSet;

use crate::error::ContainerError;
use crate::graph::vertex::Mark;
use crate::graph::{Graph, VertexId};

impl Graph {
    /// Sorts the vertices in `within`, ignoring edges that leave the set.
    ///
    /// Fails with [`ContainerError::Cycle`] naming the cycle in discovery
    /// order, closed by repeating its first vertex.
    pub(crate) fn sort(&mut self, within: &[VertexId]) -> Result<Vec<VertexId>, ContainerError> {
        let member: HashSet<VertexId> = within.iter().copied().collect();
        for id in within {
            self.vertices[id.0].mark = Mark::Unvisited;
        }

        let mut finished = Vec::with_capacity(within.len());
        let mut stack = Vec::new();
        for id in self.by_priority(within.iter().copied()) {
            if self.vertices[id.0].mark == Mark::Unvisited {
                self.visit(id, &member, &mut stack, &mut finished)?;
            }
        }
        finished.reverse();
        Ok(finished)
    }

    fn visit(
        &mut self,
        id: VertexId,
        member: &HashSet<VertexId>,
        stack: &mut Vec<VertexId>,
        finished: &mut Vec<VertexId>,
    ) -> Result<(), ContainerError> {
        self.vertices[id.0].mark = Mark::Visiting;
        stack.push(id);

        let next = self.by_priority(
            self.vertices[id.0]
                .dependents
                .iter()
                .copied()
                .filter(|d| member.contains(d)),
        );
        for d in next {
            match self.vertices[d.0].mark {
                Mark::Visited => {}
                Mark::Unvisited => self.visit(d, member, stack, finished)?,
                Mark::Visiting => {
                    let start = stack.iter().position(|s| *s == d).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..]
                        .iter()
                        .map(|v| self.vertices[v.0].name.to_string())
                        .collect();
                    path.push(self.vertices[d.0].name.to_string());
                    return Err(ContainerError::Cycle { path });
                }
            }
        }

        stack.pop();
        self.vertices[id.0].mark = Mark::Visited;
        finished.push(id);
        Ok(())
    }

    fn by_priority(&self, ids: impl Iterator<Item = VertexId>) -> Vec<VertexId> {
        let mut ids: Vec<VertexId> = ids.collect();
        ids.sort_by(|a, b| {
            let ka = self.vertices[a.0].sort_key();
            let kb = self.vertices[b.0].sort_key();
            kb.total_cmp(&ka).then(b.cmp(a))
        });
        ids
    }
}

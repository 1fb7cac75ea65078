//! # Dependency graph, resolver and scheduler.
//!
//! The graph is an arena of [`Vertex`] records addressed by [`VertexId`].
//! Edges point from a dependency to its dependent and carry an [`EdgeKind`]:
//!
//! ```text
//!   db ──Init──► cache ──Init──► http
//!    └───────Collect──────────────┘      (http collects dyn Endpoint from db)
//! ```
//!
//! Both edge kinds gate ordering. Cascading removal follows `Init` edges only:
//! a plugin that collects from a disabled provider simply loses that source.
//!
//! ## Contents
//! - `graph`: arena, provides table, edge insertion, removal cascade, subgraph reset
//! - `resolver`: turns declared dependencies and collectors into edges
//! - `toposort`: three-color DFS with cycle detection and weight tie-break
//! - [`VertexInfo`], [`EdgeInfo`]: read-only enumeration for diagnostics

use std::fmt;

use crate::state::State;

#[allow(clippy::module_inception)]
mod graph;
mod resolver;
mod toposort;
mod vertex;

pub(crate) use graph::{Graph, ProviderRef};

/// Index of a vertex in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub(crate) usize);

impl VertexId {
    /// Position of the vertex in registration order.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Origin of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The dependent receives the value in `Plugin::init`.
    Init,
    /// The dependent receives the value in a collector callback.
    Collect,
}

/// Why a plugin was excluded from the run-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableReason {
    /// `Plugin::init` returned [`PluginError::Disabled`](crate::PluginError::Disabled).
    OptedOut,
    /// No plugin provides a declared dependency.
    MissingDependency { capability: &'static str },
    /// A dependency was itself disabled.
    DependencyDisabled { dependency: String },
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisableReason::OptedOut => f.write_str("opted out"),
            DisableReason::MissingDependency { capability } => {
                write!(f, "missing dependency {capability}")
            }
            DisableReason::DependencyDisabled { dependency } => {
                write!(f, "dependency {dependency} is disabled")
            }
        }
    }
}

/// Snapshot of one registered plugin.
#[derive(Debug, Clone)]
pub struct VertexInfo {
    pub name: String,
    pub state: State,
    pub weight: u32,
    pub disabled: Option<DisableReason>,
    /// Names of the plugins this one waits for (both edge kinds).
    pub dependencies: Vec<String>,
}

/// Snapshot of one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeInfo {
    /// The dependency.
    pub from: String,
    /// The dependent.
    pub to: String,
    pub kind: EdgeKind,
    /// Type name of the capability carried by the edge.
    pub capability: &'static str,
}

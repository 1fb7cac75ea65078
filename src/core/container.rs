//! # Container: the public entry point.
//!
//! ```text
//! Container::builder(cfg).with_subscribers(..).build()
//!     register(P) ...            (Uninitialized | Error)
//!     init()    ─► resolve, sort, init in order          ─► Initialized
//!     serve()   ─► serve in order, monitors + consumer   ─► Started, results rx
//!     stop()    ─► reverse order, bounded by stop_timeout ─► Stopped
//! ```
//!
//! `run()` / `run_until()` chain the three phases and stop on a signal, on a
//! caller-supplied future, or on the first terminal serve result.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use plugvisor::{Config, Container, Dependencies, Plugin, PluginError, State};
//!
//! struct Clock;
//!
//! #[async_trait]
//! impl Plugin for Clock {
//!     async fn init(&self, _deps: &Dependencies) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), plugvisor::ContainerError> {
//!     let container = Container::new(Config::default());
//!     container.register(Clock).await?;
//!     container.init().await?;
//!     let _results = container.serve().await?;
//!     assert_eq!(container.state(), State::Started);
//!     container.stop().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};

use crate::core::builder::ContainerBuilder;
use crate::core::config::Config;
use crate::core::fsm::{Fsm, Transition};
use crate::core::monitor::{Incident, MonitorHandle};
use crate::core::registry::Registry;
use crate::core::supervisor::{ServeResult, Session};
use crate::core::{init, shutdown, supervisor};
use crate::error::{ContainerError, Op, StateError};
use crate::events::Bus;
use crate::graph::{EdgeInfo, Graph, VertexId, VertexInfo};
use crate::plugin::{Capability, Plugin};
use crate::state::{AtomicState, State};

/// Shared container internals.
pub(crate) struct Inner {
    pub(crate) cfg: Config,
    pub(crate) bus: Bus,
    pub(crate) fsm: Fsm,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) graph: RwLock<Graph>,
    /// Enabled vertices in initialization order.
    pub(crate) run_list: RwLock<Vec<VertexId>>,
    pub(crate) monitors: Mutex<HashMap<VertexId, MonitorHandle>>,
    pub(crate) session: Mutex<Option<Session>>,
    generation: AtomicU64,
}

impl Inner {
    pub(crate) async fn stop(&self) -> Result<(), ContainerError> {
        self.fsm
            .fire(Transition::Stop, shutdown::shutdown(self))
            .await
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Name, plugin and state cell of an enabled vertex.
    pub(crate) async fn vertex_parts(&self, id: VertexId) -> Option<(Arc<str>, Arc<dyn Plugin>, Arc<AtomicState>)> {
        let graph = self.graph.read().await;
        graph
            .has_vertex(id)
            .then(|| {
                let v = graph.vertex(id);
                (Arc::clone(&v.name), Arc::clone(&v.plugin), Arc::clone(&v.state))
            })
    }

    pub(crate) async fn name_of(&self, id: VertexId) -> Arc<str> {
        Arc::clone(&self.graph.read().await.vertex(id).name)
    }

    pub(crate) async fn names_of(&self, ids: &[VertexId]) -> Vec<String> {
        let graph = self.graph.read().await;
        ids.iter()
            .map(|&id| graph.vertex(id).name.to_string())
            .collect()
    }

    /// Names of vertices still `Started` or `Stopping`.
    pub(crate) async fn running(&self) -> Vec<String> {
        self.graph
            .read()
            .await
            .info()
            .into_iter()
            .filter(|v| matches!(v.state, State::Started | State::Stopping))
            .map(|v| v.name)
            .collect()
    }

    /// True if `incident` came from the monitor currently attached to its vertex.
    pub(crate) async fn is_current(&self, incident: &Incident) -> bool {
        self.monitors
            .lock()
            .await
            .get(&incident.vertex)
            .is_some_and(|m| m.generation == incident.generation)
    }
}

/// # Dependency-ordered plugin container.
///
/// Cheap to clone; clones share the same plugins and state.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    /// Creates a container without event subscribers.
    pub fn new(cfg: Config) -> Self {
        Self::builder(cfg).build()
    }

    /// Starts building a container.
    pub fn builder(cfg: Config) -> ContainerBuilder {
        ContainerBuilder::new(cfg)
    }

    pub(crate) fn from_parts(cfg: Config, bus: Bus) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                fsm: Fsm::new(bus.clone()),
                registry: RwLock::new(Registry::new(bus.clone())),
                graph: RwLock::new(Graph::new()),
                run_list: RwLock::new(Vec::new()),
                monitors: Mutex::new(HashMap::new()),
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
                bus,
            }),
        }
    }

    /// Registers a plugin.
    ///
    /// # Errors
    /// - [`ContainerError::AlreadyRegistered`] for a second plugin of the same type.
    /// - [`ContainerError::PrimitiveCapability`] if the plugin declares a primitive type.
    /// - [`ContainerError::InvalidState`] unless the container is `Uninitialized` or `Error`.
    pub async fn register<P: Plugin>(&self, plugin: P) -> Result<(), ContainerError> {
        self.register_shared(Arc::new(plugin)).await
    }

    /// Registers a plugin the caller keeps a handle to.
    pub async fn register_shared<P: Plugin>(&self, plugin: Arc<P>) -> Result<(), ContainerError> {
        let _guard = self.inner.fsm.hold().await;
        let current = self.inner.fsm.state();
        if !matches!(current, State::Uninitialized | State::Error) {
            return Err(ContainerError::InvalidState {
                op: Op::Register,
                source: StateError {
                    current,
                    requested: "register",
                },
            });
        }
        self.inner.registry.write().await.register(plugin)
    }

    /// Resolves dependencies and initializes every enabled plugin in order.
    pub async fn init(&self) -> Result<(), ContainerError> {
        self.inner
            .fsm
            .fire(Transition::Initialize, init::initialize(&self.inner))
            .await
    }

    /// Starts every service and returns the stream of serve-time outcomes.
    ///
    /// The receiver yields one [`ServeResult`] per handled incident and closes
    /// once the container has stopped.
    pub async fn serve(&self) -> Result<mpsc::Receiver<ServeResult>, ContainerError> {
        self.inner
            .fsm
            .fire(Transition::Start, supervisor::start(&self.inner))
            .await
    }

    /// Stops every started service in reverse order within `Config::stop_timeout`.
    pub async fn stop(&self) -> Result<(), ContainerError> {
        self.inner.stop().await
    }

    /// `init`, `serve`, then waits for `shutdown` or a terminal serve result
    /// and stops.
    ///
    /// Recovered incidents are logged and do not end the run. The first error
    /// wins; a stop failure is reported only if the run itself succeeded.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ContainerError>
    where
        F: Future<Output = ()>,
    {
        self.init().await?;
        let mut results = self.serve().await?;

        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                next = results.recv() => match next {
                    Some(r) if r.recovered => {
                        tracing::info!(plugin = %r.plugin, error = %r.error, "plugin recovered");
                    }
                    Some(r) => break Err(r.error),
                    None => break Ok(()),
                },
            }
        };

        let stopped = match self.state() {
            State::Started | State::Error => self.stop().await,
            _ => Ok(()),
        };
        outcome.and(stopped)
    }

    /// Like [`run_until`](Self::run_until), ending on SIGINT/SIGTERM/SIGQUIT (Ctrl-C on Windows).
    pub async fn run(&self) -> Result<(), ContainerError> {
        self.run_until(async {
            if let Err(e) = shutdown::wait_for_shutdown_signal().await {
                tracing::error!(error = %e, "cannot listen for shutdown signals");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Container lifecycle state.
    pub fn state(&self) -> State {
        self.inner.fsm.state()
    }

    /// State of the plugin registered under `name`.
    ///
    /// Names are not required to be unique; the first registration with that
    /// name is reported.
    pub async fn plugin_state(&self, name: &str) -> Option<State> {
        self.inner.registry.read().await.state_of(name)
    }

    /// Every registered plugin, with its edges once `init` has resolved them.
    pub async fn vertices(&self) -> Vec<VertexInfo> {
        let info = self.inner.graph.read().await.info();
        if info.is_empty() {
            return self.inner.registry.read().await.info();
        }
        info
    }

    /// Resolved dependency and collector edges.
    pub async fn edges(&self) -> Vec<EdgeInfo> {
        self.inner.graph.read().await.edge_info()
    }

    /// Enabled plugins providing `capability`, in registration order.
    pub async fn providers(&self, capability: Capability) -> Vec<String> {
        let graph = self.inner.graph.read().await;
        let ids = graph.find_provider(capability.type_id());
        ids.iter()
            .map(|&id| graph.vertex(id).name.to_string())
            .collect()
    }

    /// Enabled plugin names in initialization order.
    pub async fn run_list(&self) -> Vec<String> {
        let ids = self.inner.run_list.read().await.clone();
        self.inner.names_of(&ids).await
    }
}

//! # Serve supervisor: starts plugins and reacts to their incidents.
//!
//! ```text
//! start():
//!   for v in run_list:
//!     disabled            ─► skip
//!     no Service          ─► Started
//!     serve() ─► stream
//!       stream already failed ─► Error, roll back started (reverse), return Serve error
//!       else ─► spawn monitor(v, generation) ─► Started
//!   spawn consumer
//!
//! consumer (single task, owns the incident receiver):
//!   incident ─► stale generation?  drop
//!            ─► RestartPolicy::OnFailure ─► retry::recover ─► ServeResult
//!            ─► RestartPolicy::Never     ─► stop container  ─► ServeResult (terminal)
//! ```
//!
//! Every serve-time outcome is forwarded on the bounded results channel
//! returned by `Container::serve`. The consumer owns the only sender, so the
//! channel closes once the consumer exits.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::container::Inner;
use crate::core::monitor::{self, Incident, MonitorParams};
use crate::core::{retry, shutdown};
use crate::error::ContainerError;
use crate::events::{Event, EventKind};
use crate::graph::VertexId;
use crate::state::State;

/// Outcome of a serve-time incident.
///
/// `recovered == true` means the failed subgraph was restarted and is serving
/// again; `error` then describes the incident that triggered the restart.
/// Otherwise the failure is terminal for this serve session.
#[derive(Debug)]
pub struct ServeResult {
    /// Plugin whose incident produced this result.
    pub plugin: Arc<str>,
    /// What went wrong.
    pub error: ContainerError,
    /// Whether the retry controller brought the plugin back.
    pub recovered: bool,
}

/// Handles kept by the container for the running serve session.
pub(crate) struct Session {
    /// Parent of every monitor token.
    pub(crate) token: CancellationToken,
    pub(crate) consumer_token: CancellationToken,
}

/// What the consumer (and the retry controller running inside it) needs.
#[derive(Clone)]
pub(crate) struct SessionCtx {
    pub(crate) token: CancellationToken,
    pub(crate) consumer_token: CancellationToken,
    pub(crate) incidents: mpsc::Sender<Incident>,
    pub(crate) results: mpsc::Sender<ServeResult>,
}

pub(crate) async fn start(inner: &Arc<Inner>) -> Result<mpsc::Receiver<ServeResult>, ContainerError> {
    let (results_tx, results_rx) = mpsc::channel(inner.cfg.result_capacity_clamped());
    let (incidents_tx, incidents_rx) = mpsc::channel(inner.cfg.incident_capacity_clamped());
    let ctx = SessionCtx {
        token: CancellationToken::new(),
        consumer_token: CancellationToken::new(),
        incidents: incidents_tx,
        results: results_tx,
    };

    {
        let run_list = inner.run_list.read().await;
        for (pos, &id) in run_list.iter().enumerate() {
            if let Err(e) = serve_vertex(inner, id, &ctx).await {
                let started: Vec<VertexId> = run_list[..pos].iter().rev().copied().collect();
                tracing::warn!(error = %e, started = started.len(), "serve failed; rolling back");

                let deadline = Instant::now() + inner.cfg.stop_timeout;
                let report = shutdown::stop_vertices(inner, &started, deadline).await;
                report.log();
                ctx.token.cancel();
                return Err(e);
            }
        }
    }

    *inner.session.lock().await = Some(Session {
        token: ctx.token.clone(),
        consumer_token: ctx.consumer_token.clone(),
    });
    tokio::spawn(consume(Arc::clone(inner), incidents_rx, ctx));
    Ok(results_rx)
}

/// Starts one vertex and attaches a fresh monitor to its error stream.
pub(crate) async fn serve_vertex(inner: &Inner, id: VertexId, ctx: &SessionCtx) -> Result<(), ContainerError> {
    let Some((name, plugin, state)) = inner.vertex_parts(id).await else {
        return Ok(());
    };

    state.store(State::Starting);
    let Some(service) = plugin.service() else {
        state.store(State::Started);
        tracing::debug!(plugin = %name, "plugin has no service");
        return Ok(());
    };

    let mut stream = service.serve().await;
    if let Some(source) = stream.try_pending() {
        state.store(State::Error);
        tracing::warn!(plugin = %name, error = %source, "serve failed");
        return Err(ContainerError::Serve {
            plugin: name.to_string(),
            source,
        });
    }

    let generation = inner.next_generation();
    let handle = monitor::spawn(
        MonitorParams {
            vertex: id,
            name: Arc::clone(&name),
            generation,
            token: ctx.token.child_token(),
            incidents: ctx.incidents.clone(),
            bus: inner.bus.clone(),
        },
        stream,
    );
    let replaced = inner.monitors.lock().await.insert(id, handle);
    if let Some(old) = replaced {
        old.halt().await;
    }

    state.store(State::Started);
    tracing::info!(plugin = %name, generation, "plugin serving");
    inner
        .bus
        .publish(Event::new(EventKind::PluginServing).with_plugin(name));
    Ok(())
}

async fn consume(inner: Arc<Inner>, mut incidents: mpsc::Receiver<Incident>, ctx: SessionCtx) {
    loop {
        let incident = tokio::select! {
            biased;
            _ = ctx.consumer_token.cancelled() => break,
            next = incidents.recv() => match next {
                Some(incident) => incident,
                None => break,
            },
        };

        if !inner.is_current(&incident).await {
            tracing::debug!(vertex = incident.vertex.index(), generation = incident.generation, "dropping stale incident");
            continue;
        }

        if !inner.cfg.restart.retries() {
            let plugin = inner.name_of(incident.vertex).await;
            tracing::error!(plugin = %plugin, error = %incident.error, "plugin failed and restarts are disabled; stopping");
            if let Err(e) = inner.stop().await {
                tracing::error!(error = %e, "stop after incident failed");
            }
            let result = ServeResult {
                error: ContainerError::Serve {
                    plugin: plugin.to_string(),
                    source: incident.error,
                },
                plugin,
                recovered: false,
            };
            // The session is over; deliver the failure even though stop cancelled us.
            let _ = ctx.results.send(result).await;
            break;
        }

        let Some(result) = retry::recover(&inner, &ctx, incident).await else {
            break;
        };
        tokio::select! {
            biased;
            sent = ctx.results.send(result) => if sent.is_err() {
                tracing::debug!("results receiver dropped");
            },
            _ = ctx.consumer_token.cancelled() => break,
        }
    }
    tracing::debug!("incident consumer exited");
}

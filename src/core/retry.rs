//! # Retry controller: restarts the subgraph behind a failed plugin.
//!
//! ```text
//! incident(v)
//!   affected = v + transitive dependents          (reset_subgraph, sort)
//!   halt monitors of affected, in order
//!   stop still-started services of affected, in reverse
//!   rewind affected states to Uninitialized
//!   for u in affected (order):
//!     loop { init(u) ─► serve(u) }
//!       Err retryable && backoff.next_delay() = Some(d) ─► sleep(d), again
//!       Err otherwise                                  ─► BackoffExhausted
//! ```
//!
//! Plugins outside the affected set keep running and keep their state. The
//! run-list write lock is held for the whole recovery so a concurrent stop
//! waits for it (bounded by its own timeout).

use std::sync::Arc;

use tokio::time::Instant;

use crate::core::container::Inner;
use crate::core::monitor::Incident;
use crate::core::supervisor::{self, ServeResult, SessionCtx};
use crate::core::{init, shutdown};
use crate::error::{ContainerError, Op, PluginError};
use crate::events::{Event, EventKind};
use crate::graph::VertexId;
use crate::state::State;

/// Recovers from `incident`. Returns `None` if the session was cancelled meanwhile.
pub(crate) async fn recover(inner: &Arc<Inner>, ctx: &SessionCtx, incident: Incident) -> Option<ServeResult> {
    let _run_list = inner.run_list.write().await;

    let (failed, order) = {
        let mut graph = inner.graph.write().await;
        let affected = graph.reset_subgraph(incident.vertex);
        let failed = Arc::clone(&graph.vertex(incident.vertex).name);
        match graph.sort(&affected) {
            Ok(order) => (failed, order),
            Err(error) => {
                tracing::error!(plugin = %failed, %error, "cannot order the failed subgraph");
                return Some(ServeResult {
                    plugin: failed,
                    error,
                    recovered: false,
                });
            }
        }
    };

    let names = inner.names_of(&order).await;
    tracing::warn!(plugin = %failed, error = %incident.error, affected = ?names, "restarting failed subgraph");
    inner.bus.publish(
        Event::new(EventKind::RetryStarted)
            .with_plugin(Arc::clone(&failed))
            .with_reason(names.join(",")),
    );

    for id in &order {
        let handle = inner.monitors.lock().await.remove(id);
        if let Some(handle) = handle {
            handle.halt().await;
        }
    }

    let reversed: Vec<VertexId> = order.iter().rev().copied().collect();
    let report = shutdown::stop_vertices(inner, &reversed, Instant::now() + inner.cfg.stop_timeout).await;
    report.log();
    for &id in &order {
        if let Some((_, _, state)) = inner.vertex_parts(id).await {
            state.reset();
        }
    }

    let mut backoff = inner.cfg.backoff.start();
    for (pos, &id) in order.iter().enumerate() {
        let name = inner.name_of(id).await;
        let mut attempt = 0u32;
        loop {
            if ctx.consumer_token.is_cancelled() {
                return None;
            }
            attempt += 1;

            let err = match restart_vertex(inner, ctx, id, attempt).await {
                Ok(()) => break,
                Err(err) => err,
            };
            if let Some((_, _, state)) = inner.vertex_parts(id).await {
                state.reset();
            }

            let source = err
                .plugin_error()
                .cloned()
                .unwrap_or_else(|| PluginError::fatal(&err));
            let delay = if source.is_retryable() {
                backoff.next_delay()
            } else {
                None
            };

            let Some(delay) = delay else {
                for &rest in &order[pos..] {
                    if let Some((_, _, state)) = inner.vertex_parts(rest).await {
                        state.store(State::Error);
                    }
                }
                tracing::error!(plugin = %name, attempts = attempt, error = %err, "giving up on failed subgraph");
                inner.bus.publish(
                    Event::new(EventKind::BackoffExhausted)
                        .with_plugin(Arc::clone(&name))
                        .with_attempt(attempt)
                        .with_reason(err.to_string()),
                );
                return Some(ServeResult {
                    error: ContainerError::BackoffExhausted {
                        plugin: name.to_string(),
                        attempts: attempt,
                        elapsed: backoff.elapsed(),
                        source,
                    },
                    plugin: name,
                    recovered: false,
                });
            };

            tracing::warn!(plugin = %name, attempt, ?delay, error = %err, "restart failed; backing off");
            inner.bus.publish(
                Event::new(EventKind::BackoffScheduled)
                    .with_plugin(Arc::clone(&name))
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_reason(err.to_string()),
            );
            tokio::select! {
                biased;
                _ = ctx.consumer_token.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    tracing::info!(plugin = %failed, restarted = order.len(), "failed subgraph recovered");
    inner
        .bus
        .publish(Event::new(EventKind::RetrySucceeded).with_plugin(Arc::clone(&failed)));
    Some(ServeResult {
        error: ContainerError::Serve {
            plugin: failed.to_string(),
            source: incident.error,
        },
        plugin: failed,
        recovered: true,
    })
}

async fn restart_vertex(inner: &Inner, ctx: &SessionCtx, id: VertexId, attempt: u32) -> Result<(), ContainerError> {
    init::init_vertex(inner, id, Op::Retry, Some(attempt)).await?;
    supervisor::serve_vertex(inner, id, ctx).await?;
    inner.graph.write().await.mark_initialized(id);
    Ok(())
}

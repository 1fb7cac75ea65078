//! # Shutdown coordination and OS signal handling.
//!
//! ```text
//! stop():
//!   deadline = now + Config::stop_timeout
//!   cancel incident consumer (never awaited)
//!   for v in reverse(run_list):
//!     halt monitor(v)
//!     Started ─► Stopping ─► Service::stop()   (waits at most remaining / left)
//!                               └─ overran its share? keep it running, move on
//!   await overrunning stops until the deadline
//!   anything still Started/Stopping ─► StopTimeout { stuck }
//! ```
//!
//! A plugin whose `stop` overruns its share of the budget is not abandoned:
//! the walk continues with the next plugin and comes back to it at the end,
//! still bounded by the global deadline.
//!
//! [`wait_for_shutdown_signal`] completes on SIGINT/SIGTERM/SIGQUIT (Unix) or
//! Ctrl-C (Windows).

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, timeout, timeout_at};

use crate::core::container::Inner;
use crate::error::{ContainerError, PluginError};
use crate::events::{Bus, Event, EventKind};
use crate::graph::VertexId;
use crate::state::{AtomicState, State};

/// What a stop walk left behind.
#[derive(Debug, Default)]
pub(crate) struct StopReport {
    pub(crate) failures: Vec<(String, PluginError)>,
    pub(crate) stuck: Vec<String>,
}

impl StopReport {
    pub(crate) fn log(&self) {
        for (plugin, error) in &self.failures {
            tracing::warn!(%plugin, %error, "plugin failed to stop");
        }
        for plugin in &self.stuck {
            tracing::warn!(%plugin, "plugin still stopping after the deadline");
        }
    }
}

/// A `Service::stop` call that overran its share of the budget.
struct Parked {
    name: Arc<str>,
    state: Arc<AtomicState>,
    task: JoinHandle<Result<(), PluginError>>,
}

pub(crate) async fn shutdown(inner: &Inner) -> Result<(), ContainerError> {
    let budget = inner.cfg.stop_timeout;
    let deadline = Instant::now() + budget;

    tracing::info!(timeout = ?budget, "stopping container");
    inner
        .bus
        .publish(Event::new(EventKind::StopRequested).with_timeout(budget));

    let session = inner.session.lock().await.take();
    if let Some(s) = &session {
        s.consumer_token.cancel();
    }

    let report = match timeout_at(deadline, inner.run_list.read()).await {
        Ok(run_list) => {
            let order: Vec<VertexId> = run_list.iter().rev().copied().collect();
            stop_vertices(inner, &order, deadline).await
        }
        Err(_) => {
            tracing::warn!("a restart is still in progress at the stop deadline");
            StopReport {
                failures: Vec::new(),
                stuck: inner.running().await,
            }
        }
    };

    if let Some(s) = session {
        s.token.cancel();
    }

    if !report.stuck.is_empty() {
        for plugin in &report.stuck {
            tracing::error!(%plugin, "plugin did not stop within the timeout");
        }
        inner.bus.publish(
            Event::new(EventKind::StopTimeoutExceeded)
                .with_timeout(budget)
                .with_reason(report.stuck.join(",")),
        );
        return Err(ContainerError::StopTimeout {
            timeout: budget,
            stuck: report.stuck,
        });
    }
    if !report.failures.is_empty() {
        report.log();
        return Err(ContainerError::Stop {
            failures: report.failures,
        });
    }

    tracing::info!("all plugins stopped");
    inner
        .bus
        .publish(Event::new(EventKind::AllStoppedWithin).with_timeout(budget));
    Ok(())
}

/// Stops `ids` in the given order, sharing the time left until `deadline`.
pub(crate) async fn stop_vertices(inner: &Inner, ids: &[VertexId], deadline: Instant) -> StopReport {
    let mut report = StopReport::default();
    let mut parked: Vec<Parked> = Vec::new();
    let mut watched: Vec<(Arc<str>, Arc<AtomicState>)> = Vec::new();

    for (pos, &id) in ids.iter().enumerate() {
        let Some((name, plugin, state)) = inner.vertex_parts(id).await else {
            continue;
        };

        let monitor = inner.monitors.lock().await.remove(&id);
        if let Some(monitor) = monitor {
            if timeout_at(deadline, monitor.halt()).await.is_err() {
                tracing::warn!(plugin = %name, "monitor did not exit before the deadline");
            }
        }

        if !state.transition(State::Started, State::Stopping) {
            continue;
        }
        watched.push((Arc::clone(&name), Arc::clone(&state)));

        if plugin.service().is_none() {
            finish(&inner.bus, &mut report, &name, &state, Ok(Ok(())));
            continue;
        }

        tracing::debug!(plugin = %name, "stopping plugin");
        let mut task = tokio::spawn(async move {
            match plugin.service() {
                Some(service) => service.stop().await,
                None => Ok(()),
            }
        });

        let left = u32::try_from(ids.len() - pos).unwrap_or(u32::MAX);
        let share = deadline.saturating_duration_since(Instant::now()) / left;
        match timeout(share, &mut task).await {
            Ok(joined) => finish(&inner.bus, &mut report, &name, &state, joined),
            Err(_) => {
                tracing::debug!(plugin = %name, ?share, "stop overran its share; continuing");
                parked.push(Parked { name, state, task });
            }
        }
    }

    for mut p in parked {
        if let Ok(joined) = timeout_at(deadline, &mut p.task).await {
            finish(&inner.bus, &mut report, &p.name, &p.state, joined);
        }
    }

    report.stuck = watched
        .iter()
        .filter(|(_, s)| matches!(s.load(), State::Started | State::Stopping))
        .map(|(n, _)| n.to_string())
        .collect();
    report
}

fn finish(
    bus: &Bus,
    report: &mut StopReport,
    name: &Arc<str>,
    state: &AtomicState,
    joined: Result<Result<(), PluginError>, JoinError>,
) {
    let error = match joined {
        Ok(Ok(())) => {
            state.store(State::Stopped);
            tracing::info!(plugin = %name, "plugin stopped");
            bus.publish(Event::new(EventKind::PluginStopped).with_plugin(Arc::clone(name)));
            return;
        }
        Ok(Err(e)) => e,
        Err(e) => PluginError::fatal(format!("stop panicked: {e}")),
    };

    state.store(State::Error);
    bus.publish(
        Event::new(EventKind::PluginStopped)
            .with_plugin(Arc::clone(name))
            .with_reason(error.to_string()),
    );
    report.failures.push((name.to_string(), error));
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

//! # Per-plugin monitor tasks.
//!
//! One monitor per served plugin forwards the plugin's [`ErrorStream`] into the
//! shared incident channel:
//!
//! ```text
//! ErrorStream ──► monitor(vertex, generation) ──► incidents (bounded) ──► consumer
//!                      ▲
//!                 token.cancel()  (stop signal; ack = JoinHandle completes)
//! ```
//!
//! Each monitor carries a generation number. When a retry replaces a monitor,
//! incidents still queued from the old generation are recognized as stale and
//! dropped by the consumer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PluginError;
use crate::events::{Bus, Event, EventKind};
use crate::graph::VertexId;
use crate::plugin::ErrorStream;

/// A serve-time failure reported by a running plugin.
#[derive(Debug)]
pub(crate) struct Incident {
    pub(crate) vertex: VertexId,
    pub(crate) generation: u64,
    pub(crate) error: PluginError,
}

/// Handle to a running monitor.
pub(crate) struct MonitorHandle {
    pub(crate) generation: u64,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signals the monitor to stop and waits for it to exit.
    pub(crate) async fn halt(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!(generation = self.generation, error = %e, "monitor task ended abnormally");
        }
    }
}

pub(crate) struct MonitorParams {
    pub(crate) vertex: VertexId,
    pub(crate) name: Arc<str>,
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
    pub(crate) incidents: mpsc::Sender<Incident>,
    pub(crate) bus: Bus,
}

/// Spawns the monitor loop for one served plugin.
pub(crate) fn spawn(params: MonitorParams, mut stream: ErrorStream) -> MonitorHandle {
    let MonitorParams {
        vertex,
        name,
        generation,
        token,
        incidents,
        bus,
    } = params;
    let stop = token.clone();

    let join = tokio::spawn(async move {
        loop {
            let error = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                error = stream.next() => error,
            };

            tracing::warn!(plugin = %name, generation, %error, "incident reported");
            bus.publish(
                Event::new(EventKind::IncidentReported)
                    .with_plugin(Arc::clone(&name))
                    .with_reason(error.to_string()),
            );

            let incident = Incident {
                vertex,
                generation,
                error,
            };
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                sent = incidents.send(incident) => if sent.is_err() { break },
            }
        }
    });

    MonitorHandle {
        generation,
        token,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::error_channel;

    fn params(generation: u64, incidents: mpsc::Sender<Incident>) -> MonitorParams {
        MonitorParams {
            vertex: VertexId(3),
            name: Arc::from("worker"),
            generation,
            token: CancellationToken::new(),
            incidents,
            bus: Bus::new(8),
        }
    }

    #[tokio::test]
    async fn forwards_errors_tagged_with_vertex_and_generation() {
        let (tx, mut rx) = mpsc::channel(1);
        let (report, stream) = error_channel(1);
        let handle = spawn(params(7, tx), stream);

        report.report(PluginError::fail("lost connection")).await;
        let incident = rx.recv().await.expect("incident");
        assert_eq!(incident.vertex, VertexId(3));
        assert_eq!(incident.generation, 7);
        assert_eq!(incident.error, PluginError::fail("lost connection"));

        handle.halt().await;
    }

    #[tokio::test]
    async fn halt_unblocks_a_pending_send() {
        let (tx, _rx) = mpsc::channel(1);
        let (report, stream) = error_channel(4);
        let handle = spawn(params(1, tx), stream);

        // The first incident fills the queue, the second blocks the monitor.
        report.report(PluginError::fail("one")).await;
        report.report(PluginError::fail("two")).await;
        tokio::task::yield_now().await;

        handle.halt().await;
    }
}

//! # Asynchronous failure streams returned by `Service::serve`.
//!
//! A running service reports failures by sending [`PluginError`]s through an
//! [`ErrorSender`]; the container holds the matching [`ErrorStream`] and its
//! monitor forwards every error as an incident.
//!
//! ## Rules
//! - A stream that never fires means "healthy".
//! - A closed stream (all senders dropped) is also treated as healthy: the
//!   monitor simply waits for its stop signal.
//! - An error already queued when `serve` returns is a **synchronous** failure
//!   and aborts `Container::serve`.

use tokio::sync::mpsc;

use crate::error::PluginError;

/// Creates a connected sender/stream pair with the given capacity (min 1).
pub fn error_channel(capacity: usize) -> (ErrorSender, ErrorStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ErrorSender { tx }, ErrorStream { rx: Some(rx) })
}

/// Sending half kept by the plugin.
#[derive(Clone, Debug)]
pub struct ErrorSender {
    tx: mpsc::Sender<PluginError>,
}

impl ErrorSender {
    /// Reports a failure, waiting for queue space.
    ///
    /// Returns `false` if the container no longer listens.
    pub async fn report(&self, err: PluginError) -> bool {
        self.tx.send(err).await.is_ok()
    }

    /// Reports a failure without waiting; `false` if full or closed.
    pub fn try_report(&self, err: PluginError) -> bool {
        self.tx.try_send(err).is_ok()
    }
}

/// Receiving half consumed by the container.
#[derive(Debug)]
pub struct ErrorStream {
    rx: Option<mpsc::Receiver<PluginError>>,
}

impl ErrorStream {
    /// A stream that never reports anything.
    pub fn healthy() -> Self {
        Self { rx: None }
    }

    /// Takes an error that is already queued, if any.
    pub(crate) fn try_pending(&mut self) -> Option<PluginError> {
        self.rx.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    /// Waits for the next error. Never resolves for healthy or closed streams.
    pub(crate) async fn next(&mut self) -> PluginError {
        if let Some(rx) = self.rx.as_mut() {
            if let Some(err) = rx.recv().await {
                return err;
            }
            self.rx = None;
        }
        std::future::pending().await
    }
}

impl From<mpsc::Receiver<PluginError>> for ErrorStream {
    fn from(rx: mpsc::Receiver<PluginError>) -> Self {
        Self { rx: Some(rx) }
    }
}

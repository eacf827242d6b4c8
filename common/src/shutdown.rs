use std::time::Duration;

use errors::{Error, Result};
use tokio::sync::{broadcast, watch};

/// Creates the shutdown signalling pair shared by every component: the
/// handle stays on the component struct, the token moves into its worker
/// task.
pub fn shutdown_pair() -> (ShutdownHandle, ShutdownToken) {
    let (trigger, signal) = broadcast::channel(1);
    let (closed_tx, closed_rx) = watch::channel(false);
    (
        ShutdownHandle {
            trigger,
            closed: closed_rx,
        },
        ShutdownToken {
            signal,
            closed: closed_tx,
        },
    )
}

/// Component-side half: requests shutdown and observes drain completion.
#[derive(Debug)]
pub struct ShutdownHandle {
    trigger: broadcast::Sender<()>,
    closed: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Signals the worker to stop. Never blocks; safe to call repeatedly.
    pub fn close_async(&self) {
        let _ = self.trigger.send(());
    }

    /// Waits until the worker has drained and closed its channels, or until
    /// `timeout` elapses. Does not forcibly terminate the worker.
    pub async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        let mut closed = self.closed.clone();
        let result = match tokio::time::timeout(timeout, closed.wait_for(|done| *done)).await {
            // A dropped sender means the worker is gone either way.
            Ok(_) => Ok(()),
            Err(_) => Err(Error::timeout("component did not drain within the deadline")),
        };
        result
    }
}

/// Worker-side half: selectable shutdown signal plus the drained marker.
#[derive(Debug)]
pub struct ShutdownToken {
    signal: broadcast::Receiver<()>,
    closed: watch::Sender<bool>,
}

impl ShutdownToken {
    /// Completes when shutdown is requested or the handle is dropped.
    /// Multiplex every blocking operation against this.
    pub async fn triggered(&mut self) {
        // Any outcome (value, lag, closed) means stop.
        let _ = self.signal.recv().await;
    }

    /// Marks the component drained; `wait_for_close` observes this.
    pub fn finished(&self) {
        let _ = self.closed.send(true);
    }
}

//! Component interfaces shared across the workspace.
//!
//! All three kinds obey the same lifecycle contract: a component is alive
//! from constructor return until `wait_for_close` returns `Ok`, after which
//! no channel it owns may emit. `close_async` only signals; callers are
//! expected to follow up with escalating `wait_for_close` timeouts.

use std::time::Duration;

use async_trait::async_trait;
use errors::Result;
use tokio::sync::mpsc;

use crate::model::Transaction;

/// A producer of transactions. Owns the upstream acknowledgement decision.
#[async_trait]
pub trait Input: Send {
    /// Takes the producer endpoint. Returns `None` once taken.
    fn transaction_chan(&mut self) -> Option<mpsc::Receiver<Transaction>>;

    fn close_async(&mut self);

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()>;
}

impl std::fmt::Debug for dyn Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Input").finish_non_exhaustive()
    }
}

/// A consumer of transactions. Translates delivery outcome into responses.
#[async_trait]
pub trait Output: Send {
    /// Attaches the upstream transaction stream and starts consuming.
    /// A second call fails with an already-started error.
    fn consume(&mut self, transactions: mpsc::Receiver<Transaction>) -> Result<()>;

    fn close_async(&mut self);

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()>;
}

impl std::fmt::Debug for dyn Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Output").finish_non_exhaustive()
    }
}

/// A processor chain spliced between an input and its downstream: a
/// consumer endpoint on one side, a producer endpoint on the other.
#[async_trait]
pub trait Pipeline: Send {
    fn consume(&mut self, transactions: mpsc::Receiver<Transaction>) -> Result<()>;

    fn transaction_chan(&mut self) -> Option<mpsc::Receiver<Transaction>>;

    fn close_async(&mut self);

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()>;
}

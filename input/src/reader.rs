use std::time::Duration;

use async_trait::async_trait;
use common::Message;
use errors::{Error, Result};

/// Driver contract for concrete message-source integrations.
///
/// A reader delivers messages one at a time; the shell wrapping it decides
/// when to acknowledge. Acknowledgement is covering: a single call resolves
/// every delivery outstanding since the previous one, which is what lets a
/// downstream batcher defer decisions with SkipAck.
#[async_trait]
pub trait Reader: Send {
    /// Establishes the connection to the source.
    async fn connect(&mut self) -> Result<()>;

    /// Pulls the next message. A `NotConnected` error tells the shell to
    /// reconnect before reading again.
    async fn read(&mut self) -> Result<Message>;

    /// Resolves the outstanding deliveries: `None` commits them upstream,
    /// an error leaves them open for redelivery.
    async fn acknowledge(&mut self, err: Option<&Error>) -> Result<()>;

    fn close_async(&mut self);

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()>;
}

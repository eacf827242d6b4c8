use std::time::Duration;

use async_trait::async_trait;
use common::Message;
use errors::Result;

/// Driver contract for concrete message-sink integrations.
///
/// A writer delivers one message at a time; the shell wrapping it turns the
/// outcome of each write into the transaction's response. A `NotConnected`
/// error tells the shell to reconnect before writing again.
#[async_trait]
pub trait Writer: Send {
    /// Establishes the connection to the sink.
    async fn connect(&mut self) -> Result<()>;

    /// Attempts to deliver a message to the sink.
    async fn write(&mut self, msg: &Message) -> Result<()>;

    fn close_async(&mut self);

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()>;
}

use tokio::sync::mpsc;

use crate::model::{Message, Response};

/// Receiving half of a transaction's reply channel, held by the originator.
pub type ReplyReceiver = mpsc::UnboundedReceiver<Response>;

/// A message coupled with the return path for its acknowledgement.
///
/// Transactions flow strictly forward along transaction channels; the
/// embedded reply sink carries information backward. Whoever holds the
/// transaction owns the payload and is responsible for eventually delivering
/// a final [`Response`] (Ack or Error) on the sink. An interim
/// [`Response::SkipAck`] may precede it when the decision is deferred by a
/// batching component.
#[derive(Debug)]
pub struct Transaction {
    pub payload: Message,
    pub reply: ReplySender,
}

impl Transaction {
    /// Creates a transaction around `payload`, returning the receiver the
    /// originator awaits responses on.
    pub fn new(payload: Message) -> (Self, ReplyReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Transaction {
                payload,
                reply: ReplySender { tx },
            },
            rx,
        )
    }

    pub fn into_parts(self) -> (Message, ReplySender) {
        (self.payload, self.reply)
    }
}

/// Sending half of a transaction's reply channel.
///
/// Clonable so a batching component can retain the sinks of every combined
/// upstream transaction and fan a covering response out to all of them.
#[derive(Debug, Clone)]
pub struct ReplySender {
    tx: mpsc::UnboundedSender<Response>,
}

impl ReplySender {
    /// Delivers a response. Returns `false` when the originator has already
    /// dropped its receiver, which is not an error: covering responses may
    /// arrive after the originator stopped listening.
    pub fn send(&self, response: Response) -> bool {
        self.tx.send(response).is_ok()
    }
}

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::model::Transaction;

const PIPE_CAPACITY: usize = 64;

struct InprocPipe {
    tx: mpsc::Sender<Transaction>,
    rx: Option<mpsc::Receiver<Transaction>>,
}

/// Opaque handle passed to every constructor for cross-component lookup.
///
/// Its one concrete duty is owning the named in-process transaction pipes
/// that connect an `inproc` output to an `inproc` input inside the same
/// process. A pipe is created lazily on first reference from either side;
/// transactions cross it whole, so acknowledgements flow end to end.
#[derive(Default)]
pub struct Manager {
    pipes: DashMap<String, InprocPipe>,
}

impl Manager {
    pub fn new() -> Self {
        Manager::default()
    }

    /// Sender side of the named pipe, creating the pipe if needed.
    pub fn pipe_sender(&self, name: &str) -> mpsc::Sender<Transaction> {
        self.pipes
            .entry(name.to_string())
            .or_insert_with(new_pipe)
            .tx
            .clone()
    }

    /// Claims the receiver side of the named pipe. Returns `None` when an
    /// input has already claimed it.
    pub fn take_pipe_receiver(&self, name: &str) -> Option<mpsc::Receiver<Transaction>> {
        self.pipes
            .entry(name.to_string())
            .or_insert_with(new_pipe)
            .rx
            .take()
    }
}

fn new_pipe() -> InprocPipe {
    let (tx, rx) = mpsc::channel(PIPE_CAPACITY);
    InprocPipe { tx, rx: Some(rx) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;

    #[tokio::test]
    async fn test_pipe_connects_sender_to_receiver() {
        let mgr = Manager::new();
        let tx = mgr.pipe_sender("bridge");
        let mut rx = mgr.take_pipe_receiver("bridge").expect("unclaimed pipe");

        let (txn, _res) = Transaction::new(Message::new(vec![b"x".to_vec()]));
        tx.send(txn).await.expect("pipe open");
        let received = rx.recv().await.expect("transaction forwarded");
        assert_eq!(received.payload.get(0), Some(&b"x"[..]));
    }

    #[test]
    fn test_receiver_claimed_once() {
        let mgr = Manager::new();
        assert!(mgr.take_pipe_receiver("p").is_some());
        assert!(mgr.take_pipe_receiver("p").is_none());
    }
}

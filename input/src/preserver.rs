use std::time::Duration;

use async_trait::async_trait;
use common::Message;
use errors::{Error, Result};

use crate::reader::Reader;

/// Wraps a [`Reader`] so that a failed acknowledgement re-delivers the same
/// message on the next read instead of pulling from the inner reader.
///
/// At most one message is deferred; once it is finally acknowledged the
/// inner reader is consulted again.
pub struct Preserver<R> {
    reader: R,
    retained: Option<Message>,
    resend: bool,
}

impl<R: Reader> Preserver<R> {
    pub fn new(reader: R) -> Self {
        Preserver {
            reader,
            retained: None,
            resend: false,
        }
    }
}

#[async_trait]
impl<R: Reader> Reader for Preserver<R> {
    async fn connect(&mut self) -> Result<()> {
        self.reader.connect().await
    }

    async fn read(&mut self) -> Result<Message> {
        if self.resend {
            if let Some(msg) = self.retained.clone() {
                self.resend = false;
                return Ok(msg);
            }
        }
        let msg = self.reader.read().await?;
        self.retained = Some(msg.clone());
        Ok(msg)
    }

    async fn acknowledge(&mut self, err: Option<&Error>) -> Result<()> {
        if err.is_some() {
            // Arm re-delivery; the inner reader is not told anything.
            self.resend = true;
            return Ok(());
        }
        self.retained = None;
        self.resend = false;
        self.reader.acknowledge(None).await
    }

    fn close_async(&mut self) {
        self.reader.close_async();
    }

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()> {
        self.reader.wait_for_close(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct MockReader {
        queue: VecDeque<Message>,
        reads: Arc<AtomicUsize>,
        acks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Reader for MockReader {
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn read(&mut self) -> Result<Message> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.queue.pop_front().ok_or_else(Error::not_connected)
        }

        async fn acknowledge(&mut self, _err: Option<&Error>) -> Result<()> {
            self.acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close_async(&mut self) {}

        async fn wait_for_close(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_ack_causes_redelivery() {
        let reads = Arc::new(AtomicUsize::new(0));
        let acks = Arc::new(AtomicUsize::new(0));
        let inner = MockReader {
            queue: VecDeque::from([
                Message::new(vec![b"first".to_vec()]),
                Message::new(vec![b"second".to_vec()]),
            ]),
            reads: reads.clone(),
            acks: acks.clone(),
        };
        let mut preserver = Preserver::new(inner);
        preserver.connect().await.unwrap();

        let msg = preserver.read().await.unwrap();
        assert_eq!(msg.get(0), Some(&b"first"[..]));

        // Delivery fails: the same message comes back without another
        // consult of the inner reader.
        let failure = Error::delivery("downstream rejected");
        preserver.acknowledge(Some(&failure)).await.unwrap();
        assert_eq!(acks.load(Ordering::SeqCst), 0);

        let redelivered = preserver.read().await.unwrap();
        assert_eq!(redelivered.get(0), Some(&b"first"[..]));
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        // A clean acknowledgement releases it and reads move on.
        preserver.acknowledge(None).await.unwrap();
        assert_eq!(acks.load(Ordering::SeqCst), 1);

        let next = preserver.read().await.unwrap();
        assert_eq!(next.get(0), Some(&b"second"[..]));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_failures_keep_redelivering() {
        let reads = Arc::new(AtomicUsize::new(0));
        let acks = Arc::new(AtomicUsize::new(0));
        let inner = MockReader {
            queue: VecDeque::from([Message::new(vec![b"only".to_vec()])]),
            reads: reads.clone(),
            acks: acks.clone(),
        };
        let mut preserver = Preserver::new(inner);

        let failure = Error::delivery("still failing");
        for _ in 0..3 {
            let msg = preserver.read().await.unwrap();
            assert_eq!(msg.get(0), Some(&b"only"[..]));
            preserver.acknowledge(Some(&failure)).await.unwrap();
        }
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }
}

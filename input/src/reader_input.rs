use std::time::Duration;

use async_trait::async_trait;
use common::shutdown::{shutdown_pair, ShutdownHandle, ShutdownToken};
use common::{Input, Response, Transaction};
use errors::Result;
use log::{debug, error, info, warn};
use metrics::{counter, Counter};
use tokio::sync::mpsc;

use crate::reader::Reader;

const CONNECT_RETRY: Duration = Duration::from_secs(1);
const READER_CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Shell that turns a [`Reader`] driver into an [`Input`].
///
/// Drives the reader on its own task: read, emit as a transaction, await the
/// response. A SkipAck response keeps the upstream delivery open and moves
/// straight to the next read; Ack and Error are translated into a covering
/// acknowledgement on the reader.
pub struct ReaderInput {
    out_rx: Option<mpsc::Receiver<Transaction>>,
    handle: ShutdownHandle,
}

impl ReaderInput {
    pub fn new<R: Reader + 'static>(name: &'static str, reader: R) -> Self {
        let (out_tx, out_rx) = mpsc::channel(1);
        let (handle, token) = shutdown_pair();
        tokio::spawn(run_reader(name, reader, out_tx, token));
        ReaderInput {
            out_rx: Some(out_rx),
            handle,
        }
    }
}

#[async_trait]
impl Input for ReaderInput {
    fn transaction_chan(&mut self) -> Option<mpsc::Receiver<Transaction>> {
        self.out_rx.take()
    }

    fn close_async(&mut self) {
        self.handle.close_async();
    }

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()> {
        self.handle.wait_for_close(timeout).await
    }
}

async fn run_reader<R: Reader>(
    name: &'static str,
    mut reader: R,
    out_tx: mpsc::Sender<Transaction>,
    mut token: ShutdownToken,
) {
    let m_received = counter!("input_received", "input" => name);
    let m_acked = counter!("input_acked", "input" => name);
    let m_deferred = counter!("input_deferred", "input" => name);
    let m_conn_failed = counter!("input_connection_failed", "input" => name);

    if connect_with_retry(name, &mut reader, &mut token, &m_conn_failed).await {
        info!("input {name}: connected");

        'main: loop {
            let msg = tokio::select! {
                _ = token.triggered() => break 'main,
                result = reader.read() => match result {
                    Ok(msg) => msg,
                    Err(err) if err.is_not_connected() => {
                        warn!("input {name}: connection lost, reconnecting");
                        if !connect_with_retry(name, &mut reader, &mut token, &m_conn_failed).await
                        {
                            break 'main;
                        }
                        continue 'main;
                    }
                    Err(err) => {
                        error!("input {name}: read failed: {err}");
                        tokio::select! {
                            _ = token.triggered() => break 'main,
                            _ = tokio::time::sleep(CONNECT_RETRY) => continue 'main,
                        }
                    }
                },
            };
            m_received.increment(1);

            let (txn, mut response_rx) = Transaction::new(msg);
            let sent = tokio::select! {
                _ = token.triggered() => false,
                permit = out_tx.reserve() => match permit {
                    Ok(permit) => {
                        permit.send(txn);
                        true
                    }
                    Err(_) => false,
                },
            };
            if !sent {
                break 'main;
            }

            let response = tokio::select! {
                _ = token.triggered() => break 'main,
                response = response_rx.recv() => response,
            };
            match response {
                Some(Response::SkipAck) => {
                    // Delivery stays open; the next final response covers it.
                    m_deferred.increment(1);
                }
                Some(Response::Ack) => {
                    m_acked.increment(1);
                    if let Err(err) = reader.acknowledge(None).await {
                        error!("input {name}: acknowledge failed: {err}");
                    }
                }
                Some(Response::Error(err)) => {
                    debug!("input {name}: delivery failed: {err}");
                    if let Err(ack_err) = reader.acknowledge(Some(&err)).await {
                        error!("input {name}: acknowledge failed: {ack_err}");
                    }
                }
                None => break 'main,
            }
        }
    }

    reader.close_async();
    if let Err(err) = reader.wait_for_close(READER_CLOSE_GRACE).await {
        warn!("input {name}: reader did not close cleanly: {err}");
    }
    drop(out_tx);
    token.finished();
    debug!("input {name}: closed");
}

async fn connect_with_retry<R: Reader>(
    name: &'static str,
    reader: &mut R,
    token: &mut ShutdownToken,
    m_conn_failed: &Counter,
) -> bool {
    loop {
        let result = tokio::select! {
            _ = token.triggered() => return false,
            result = reader.connect() => result,
        };
        match result {
            Ok(()) => return true,
            Err(err) => {
                m_conn_failed.increment(1);
                error!("input {name}: connect failed: {err}");
                tokio::select! {
                    _ = token.triggered() => return false,
                    _ = tokio::time::sleep(CONNECT_RETRY) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use common::Message;
    use errors::Error;

    use super::*;
    use crate::preserver::Preserver;

    /// Reader fed from a queue, recording every acknowledgement.
    struct MockReader {
        queue: Arc<Mutex<VecDeque<Message>>>,
        acks: Arc<Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl Reader for MockReader {
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn read(&mut self) -> Result<Message> {
            loop {
                if let Some(msg) = self.queue.lock().unwrap().pop_front() {
                    return Ok(msg);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        async fn acknowledge(&mut self, err: Option<&Error>) -> Result<()> {
            self.acks.lock().unwrap().push(err.map(|e| e.to_string()));
            Ok(())
        }

        fn close_async(&mut self) {}

        async fn wait_for_close(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }
    }

    fn mock_reader(
        messages: &[&str],
    ) -> (
        MockReader,
        Arc<Mutex<VecDeque<Message>>>,
        Arc<Mutex<Vec<Option<String>>>>,
    ) {
        let queue = Arc::new(Mutex::new(
            messages
                .iter()
                .map(|m| Message::new(vec![m.as_bytes().to_vec()]))
                .collect::<VecDeque<_>>(),
        ));
        let acks = Arc::new(Mutex::new(Vec::new()));
        (
            MockReader {
                queue: queue.clone(),
                acks: acks.clone(),
            },
            queue,
            acks,
        )
    }

    #[tokio::test]
    async fn test_ack_and_error_reach_the_reader() {
        let (reader, _queue, acks) = mock_reader(&["one", "two"]);
        let mut input = ReaderInput::new("mock", reader);
        let mut transactions = input.transaction_chan().expect("first take");

        let txn = transactions.recv().await.unwrap();
        assert_eq!(txn.payload.get(0), Some(&b"one"[..]));
        txn.reply.send(Response::Ack);

        let txn = transactions.recv().await.unwrap();
        assert_eq!(txn.payload.get(0), Some(&b"two"[..]));
        txn.reply
            .send(Response::Error(Error::delivery("endpoint down")));

        // The second acknowledgement carries the failure.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            if acks.lock().unwrap().len() == 2 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "acks not recorded");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let recorded = acks.lock().unwrap();
        assert_eq!(recorded[0], None);
        assert!(recorded[1].as_deref().unwrap().contains("endpoint down"));
        drop(recorded);

        input.close_async();
        input.wait_for_close(Duration::from_secs(1)).await.unwrap();
        assert!(transactions.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_skip_ack_defers_acknowledgement() {
        let (reader, _queue, acks) = mock_reader(&["a", "b"]);
        let mut input = ReaderInput::new("mock", reader);
        let mut transactions = input.transaction_chan().unwrap();

        // Defer the first delivery; the reader must not be acknowledged.
        let txn = transactions.recv().await.unwrap();
        txn.reply.send(Response::SkipAck);

        // The input keeps producing and the next Ack covers both.
        let txn = transactions.recv().await.unwrap();
        txn.reply.send(Response::Ack);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            if !acks.lock().unwrap().is_empty() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "ack not recorded");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(acks.lock().unwrap().as_slice(), &[None]);

        input.close_async();
        input.wait_for_close(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_preserver_redelivers_through_the_shell() {
        let (reader, _queue, _acks) = mock_reader(&["payload"]);
        let mut input = ReaderInput::new("mock", Preserver::new(reader));
        let mut transactions = input.transaction_chan().unwrap();

        let txn = transactions.recv().await.unwrap();
        assert_eq!(txn.payload.get(0), Some(&b"payload"[..]));
        txn.reply
            .send(Response::Error(Error::delivery("not this time")));

        // The same message comes around again after the failure.
        let txn = transactions.recv().await.unwrap();
        assert_eq!(txn.payload.get(0), Some(&b"payload"[..]));
        txn.reply.send(Response::Ack);

        input.close_async();
        input.wait_for_close(Duration::from_secs(1)).await.unwrap();
    }
}

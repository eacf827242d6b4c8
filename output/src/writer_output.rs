use std::time::Duration;

use async_trait::async_trait;
use common::shutdown::{shutdown_pair, ShutdownHandle, ShutdownToken};
use common::{Output, Response, Transaction};
use errors::{Error, Result};
use log::{debug, error, warn};
use metrics::{counter, Counter};
use tokio::sync::mpsc;

use crate::writer::Writer;

const CONNECT_RETRY: Duration = Duration::from_secs(1);
const WRITER_CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Shell that turns a [`Writer`] driver into an [`Output`].
///
/// Consumes transactions one at a time, attempts the write and responds Ack
/// on success or the write error on failure. Transactions still queued at
/// shutdown are answered with a cancellation error so their sources can
/// re-queue them.
pub struct WriterOutput<W> {
    name: &'static str,
    worker: Option<(W, ShutdownToken)>,
    handle: ShutdownHandle,
}

impl<W: Writer + 'static> WriterOutput<W> {
    pub fn new(name: &'static str, writer: W) -> Self {
        let (handle, token) = shutdown_pair();
        WriterOutput {
            name,
            worker: Some((writer, token)),
            handle,
        }
    }
}

#[async_trait]
impl<W: Writer + 'static> Output for WriterOutput<W> {
    fn consume(&mut self, transactions: mpsc::Receiver<Transaction>) -> Result<()> {
        let (writer, token) = self.worker.take().ok_or_else(Error::already_started)?;
        tokio::spawn(run_writer(self.name, writer, transactions, token));
        Ok(())
    }

    fn close_async(&mut self) {
        self.handle.close_async();
    }

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()> {
        self.handle.wait_for_close(timeout).await
    }
}

async fn run_writer<W: Writer>(
    name: &'static str,
    mut writer: W,
    mut transactions: mpsc::Receiver<Transaction>,
    mut token: ShutdownToken,
) {
    let m_count = counter!("output_count", "output" => name);
    let m_sent = counter!("output_sent", "output" => name);
    let m_error = counter!("output_error", "output" => name);
    let m_conn_failed = counter!("output_connection_failed", "output" => name);

    if connect_with_retry(name, &mut writer, &mut token, &m_conn_failed).await {
        'main: loop {
            let txn = tokio::select! {
                _ = token.triggered() => break 'main,
                received = transactions.recv() => match received {
                    Some(txn) => txn,
                    None => break 'main,
                },
            };
            m_count.increment(1);

            let (msg, reply) = txn.into_parts();
            match writer.write(&msg).await {
                Ok(()) => {
                    m_sent.increment(1);
                    reply.send(Response::Ack);
                }
                Err(err) => {
                    m_error.increment(1);
                    error!("output {name}: write failed: {err}");
                    let lost_connection = err.is_not_connected();
                    reply.send(Response::Error(err));
                    if lost_connection
                        && !connect_with_retry(name, &mut writer, &mut token, &m_conn_failed).await
                    {
                        break 'main;
                    }
                }
            }
        }
    }

    // Everything still queued finds a response before the channel dies.
    transactions.close();
    while let Ok(txn) = transactions.try_recv() {
        txn.reply.send(Response::Error(Error::cancelled()));
    }

    writer.close_async();
    if let Err(err) = writer.wait_for_close(WRITER_CLOSE_GRACE).await {
        warn!("output {name}: writer did not close cleanly: {err}");
    }
    token.finished();
    debug!("output {name}: closed");
}

async fn connect_with_retry<W: Writer>(
    name: &'static str,
    writer: &mut W,
    token: &mut ShutdownToken,
    m_conn_failed: &Counter,
) -> bool {
    loop {
        let result = tokio::select! {
            _ = token.triggered() => return false,
            result = writer.connect() => result,
        };
        match result {
            Ok(()) => return true,
            Err(err) => {
                m_conn_failed.increment(1);
                error!("output {name}: connect failed: {err}");
                tokio::select! {
                    _ = token.triggered() => return false,
                    _ = tokio::time::sleep(CONNECT_RETRY) => {}
                }
            }
        }
    }
}

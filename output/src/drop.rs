use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::shutdown::{shutdown_pair, ShutdownHandle, ShutdownToken};
use common::{Manager, Output, Response, Transaction};
use errors::{Error, Result};
use log::debug;
use metrics::counter;
use tokio::sync::mpsc;

use crate::Config;

pub fn new_drop(_conf: &Config, _manager: &Arc<Manager>) -> Result<Box<dyn Output>> {
    Ok(Box::new(DropOutput::new()))
}

/// Discards every message and acknowledges it upstream.
pub struct DropOutput {
    worker: Option<ShutdownToken>,
    handle: ShutdownHandle,
}

impl DropOutput {
    pub fn new() -> Self {
        let (handle, token) = shutdown_pair();
        DropOutput {
            worker: Some(token),
            handle,
        }
    }
}

impl Default for DropOutput {
    fn default() -> Self {
        DropOutput::new()
    }
}

#[async_trait]
impl Output for DropOutput {
    fn consume(&mut self, transactions: mpsc::Receiver<Transaction>) -> Result<()> {
        let token = self.worker.take().ok_or_else(Error::already_started)?;
        tokio::spawn(run_drop(transactions, token));
        Ok(())
    }

    fn close_async(&mut self) {
        self.handle.close_async();
    }

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()> {
        self.handle.wait_for_close(timeout).await
    }
}

async fn run_drop(mut transactions: mpsc::Receiver<Transaction>, mut token: ShutdownToken) {
    let m_dropped = counter!("output_count", "output" => "drop");

    loop {
        tokio::select! {
            _ = token.triggered() => break,
            received = transactions.recv() => match received {
                Some(txn) => {
                    m_dropped.increment(1);
                    txn.reply.send(Response::Ack);
                }
                None => break,
            }
        }
    }

    transactions.close();
    while let Ok(txn) = transactions.try_recv() {
        txn.reply.send(Response::Error(Error::cancelled()));
    }
    token.finished();
    debug!("output drop: closed");
}

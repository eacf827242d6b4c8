use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::shutdown::{shutdown_pair, ShutdownHandle, ShutdownToken};
use common::{Input, Manager, Response, Transaction};
use errors::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Config;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InprocConfig {
    /// Name of the in-process pipe to consume from.
    pub name: String,
}

pub fn new_inproc(conf: &Config, manager: &Arc<Manager>) -> Result<Box<dyn Input>> {
    Ok(Box::new(InprocInput::new(&conf.inproc, manager)?))
}

/// Consumes transactions from a named in-process pipe owned by the
/// [`Manager`]. Transactions are forwarded whole, so acknowledgement flows
/// straight back to whoever fed the pipe.
#[derive(Debug)]
pub struct InprocInput {
    out_rx: Option<mpsc::Receiver<Transaction>>,
    handle: ShutdownHandle,
}

impl InprocInput {
    pub fn new(conf: &InprocConfig, manager: &Arc<Manager>) -> Result<Self> {
        let pipe_rx = manager.take_pipe_receiver(&conf.name).ok_or_else(|| {
            Error::config(format!("inproc pipe '{}' already has a consumer", conf.name))
        })?;
        let (out_tx, out_rx) = mpsc::channel(1);
        let (handle, token) = shutdown_pair();
        tokio::spawn(run_inproc(conf.name.clone(), pipe_rx, out_tx, token));
        Ok(InprocInput {
            out_rx: Some(out_rx),
            handle,
        })
    }
}

#[async_trait]
impl Input for InprocInput {
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

async fn run_inproc(
    name: String,
    mut pipe_rx: mpsc::Receiver<Transaction>,
    out_tx: mpsc::Sender<Transaction>,
    mut token: ShutdownToken,
) {
    loop {
        tokio::select! {
            _ = token.triggered() => break,
            received = pipe_rx.recv() => match received {
                Some(txn) => {
                    let forwarded = tokio::select! {
                        _ = token.triggered() => {
                            txn.reply.send(Response::Error(Error::cancelled()));
                            false
                        }
                        permit = out_tx.reserve() => match permit {
                            Ok(permit) => {
                                permit.send(txn);
                                true
                            }
                            Err(_) => false,
                        },
                    };
                    if !forwarded {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    // Whatever is still queued in the pipe finds a response before the
    // receiver dies, so feeders can re-queue.
    pipe_rx.close();
    while let Ok(txn) = pipe_rx.try_recv() {
        txn.reply.send(Response::Error(Error::cancelled()));
    }

    drop(out_tx);
    token.finished();
    debug!("input inproc '{name}': closed");
}

#[cfg(test)]
mod tests {
    use common::Message;

    use super::*;

    #[tokio::test]
    async fn test_forwards_transactions_with_replies_intact() {
        let manager = Arc::new(Manager::new());
        let conf = InprocConfig {
            name: "pipe".to_string(),
        };
        let mut input = InprocInput::new(&conf, &manager).unwrap();
        let mut transactions = input.transaction_chan().unwrap();

        let pipe = manager.pipe_sender("pipe");
        let (txn, mut response_rx) = Transaction::new(Message::new(vec![b"x".to_vec()]));
        pipe.send(txn).await.unwrap();

        let forwarded = transactions.recv().await.unwrap();
        forwarded.reply.send(Response::Ack);
        assert!(response_rx.recv().await.unwrap().is_ack());

        input.close_async();
        input.wait_for_close(Duration::from_secs(1)).await.unwrap();
        assert!(transactions.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_pipe_claimed_once() {
        let manager = Arc::new(Manager::new());
        let conf = InprocConfig {
            name: "solo".to_string(),
        };
        let _first = InprocInput::new(&conf, &manager).unwrap();
        let err = InprocInput::new(&conf, &manager).expect_err("second claim");
        assert!(err.is_config());
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::shutdown::{shutdown_pair, ShutdownHandle, ShutdownToken};
use common::{Manager, Output, Response, Transaction};
use errors::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Config;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InprocConfig {
    /// Name of the in-process pipe to feed.
    pub name: String,
}

pub fn new_inproc(conf: &Config, manager: &Arc<Manager>) -> Result<Box<dyn Output>> {
    Ok(Box::new(InprocOutput::new(&conf.inproc, manager)))
}

/// Forwards consumed transactions into a named in-process pipe owned by the
/// [`Manager`]. The transaction crosses whole, reply sink included, so
/// end-to-end acknowledgement is untouched by the hop.
pub struct InprocOutput {
    name: String,
    pipe_tx: mpsc::Sender<Transaction>,
    token: Option<ShutdownToken>,
    handle: ShutdownHandle,
}

impl InprocOutput {
    pub fn new(conf: &InprocConfig, manager: &Arc<Manager>) -> Self {
        let (handle, token) = shutdown_pair();
        InprocOutput {
            name: conf.name.clone(),
            pipe_tx: manager.pipe_sender(&conf.name),
            token: Some(token),
            handle,
        }
    }
}

#[async_trait]
impl Output for InprocOutput {
    fn consume(&mut self, transactions: mpsc::Receiver<Transaction>) -> Result<()> {
        let token = self.token.take().ok_or_else(Error::already_started)?;
        tokio::spawn(run_inproc(
            self.name.clone(),
            self.pipe_tx.clone(),
            transactions,
            token,
        ));
        Ok(())
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
    pipe_tx: mpsc::Sender<Transaction>,
    mut transactions: mpsc::Receiver<Transaction>,
    mut token: ShutdownToken,
) {
    'main: loop {
        let txn = tokio::select! {
            _ = token.triggered() => break 'main,
            received = transactions.recv() => match received {
                Some(txn) => txn,
                None => break 'main,
            },
        };
        tokio::select! {
            _ = token.triggered() => {
                txn.reply.send(Response::Error(Error::cancelled()));
                break 'main;
            }
            permit = pipe_tx.reserve() => match permit {
                Ok(permit) => permit.send(txn),
                Err(_) => {
                    txn.reply
                        .send(Response::Error(Error::delivery("inproc pipe closed")));
                    break 'main;
                }
            },
        }
    }

    transactions.close();
    while let Ok(txn) = transactions.try_recv() {
        txn.reply.send(Response::Error(Error::cancelled()));
    }
    token.finished();
    debug!("output inproc '{name}': closed");
}

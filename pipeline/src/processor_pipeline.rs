use std::ops::ControlFlow;
use std::time::Duration;

use async_trait::async_trait;
use common::interface::Pipeline;
use common::shutdown::{shutdown_pair, ShutdownHandle, ShutdownToken};
use common::{Message, ReplySender, Response, Transaction};
use errors::{Error, Result};
use futures::future::join_all;
use log::debug;
use metrics::{counter, Counter};
use processor::{Processor, ProcessorOutput};
use tokio::sync::mpsc;

const TRANSACTION_CHAN_CAPACITY: usize = 16;

/// Hosts an ordered processor chain between an upstream and a downstream
/// transaction stream, with full acknowledgement routing.
///
/// Deferred acknowledgements follow the ack-on-all strategy: a sink that
/// received an interim SkipAck is retained, and the next emission to resolve
/// delivers its final response to every retained sink as well as its own.
pub struct ProcessorPipeline {
    worker: Option<Worker>,
    out_rx: Option<mpsc::Receiver<Transaction>>,
    handle: ShutdownHandle,
}

struct Worker {
    processors: Vec<Box<dyn Processor>>,
    out_tx: mpsc::Sender<Transaction>,
    token: ShutdownToken,
}

impl ProcessorPipeline {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        let (out_tx, out_rx) = mpsc::channel(TRANSACTION_CHAN_CAPACITY);
        let (handle, token) = shutdown_pair();
        ProcessorPipeline {
            worker: Some(Worker {
                processors,
                out_tx,
                token,
            }),
            out_rx: Some(out_rx),
            handle,
        }
    }
}

#[async_trait]
impl Pipeline for ProcessorPipeline {
    fn consume(&mut self, transactions: mpsc::Receiver<Transaction>) -> Result<()> {
        let worker = self.worker.take().ok_or_else(Error::already_started)?;
        tokio::spawn(run_pipeline(worker, transactions));
        Ok(())
    }

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

struct Counters {
    received: Counter,
    sent: Counter,
    deferred: Counter,
}

async fn run_pipeline(worker: Worker, mut upstream: mpsc::Receiver<Transaction>) {
    let Worker {
        mut processors,
        out_tx,
        mut token,
    } = worker;

    let counters = Counters {
        received: counter!("pipeline_processor_count"),
        sent: counter!("pipeline_processor_sent"),
        deferred: counter!("pipeline_processor_deferred"),
    };

    // Sinks answered with an interim SkipAck, awaiting a covering response.
    let mut deferred: Vec<ReplySender> = Vec::new();

    loop {
        tokio::select! {
            _ = token.triggered() => break,
            received = upstream.recv() => match received {
                Some(txn) => {
                    counters.received.increment(1);
                    let flow =
                        dispatch(&mut processors, txn, &out_tx, &mut deferred, &mut token, &counters)
                            .await;
                    if flow.is_break() {
                        break;
                    }
                }
                None => {
                    // Upstream signalled teardown: give stateful processors a
                    // chance to surrender buffered state, then stop.
                    let _ = drain(&mut processors, &out_tx, &mut deferred, &mut token, &counters)
                        .await;
                    break;
                }
            }
        }
    }

    cancel_deferred(&mut deferred);
    drop(out_tx);
    token.finished();
    debug!("pipeline: closed");
}

/// Outcome of threading one message through (part of) the chain.
enum ChainOutcome {
    /// A processor routed a response straight back upstream; nothing is
    /// forwarded downstream.
    Decided(Response),
    /// Messages to emit downstream. An empty list means the chain consumed
    /// the message without deciding, which the caller treats as an Ack.
    Emitted(Vec<Message>),
}

fn run_chain(processors: &mut [Box<dyn Processor>], seed: Message) -> ChainOutcome {
    let mut msgs = vec![seed];
    for proc in processors.iter_mut() {
        let mut next = Vec::new();
        for msg in std::mem::take(&mut msgs) {
            match proc.process(msg) {
                ProcessorOutput::Emit(out) => next.extend(out),
                ProcessorOutput::Respond(res) => return ChainOutcome::Decided(res),
            }
        }
        msgs = next;
        if msgs.is_empty() {
            break;
        }
    }
    ChainOutcome::Emitted(msgs)
}

async fn dispatch(
    processors: &mut [Box<dyn Processor>],
    txn: Transaction,
    out_tx: &mpsc::Sender<Transaction>,
    deferred: &mut Vec<ReplySender>,
    token: &mut ShutdownToken,
    counters: &Counters,
) -> ControlFlow<()> {
    let (payload, reply) = txn.into_parts();

    match run_chain(processors, payload) {
        ChainOutcome::Decided(Response::SkipAck) => {
            counters.deferred.increment(1);
            reply.send(Response::SkipAck);
            deferred.push(reply);
            ControlFlow::Continue(())
        }
        ChainOutcome::Decided(res) => {
            reply.send(res);
            ControlFlow::Continue(())
        }
        ChainOutcome::Emitted(msgs) if msgs.is_empty() => {
            reply.send(Response::Ack);
            ControlFlow::Continue(())
        }
        ChainOutcome::Emitted(msgs) => {
            emit(msgs, Some(reply), out_tx, deferred, token, counters).await
        }
    }
}

/// Emits `msgs` as child transactions, aggregates their responses and routes
/// the result to `origin` plus every retained sink. `origin` is `None` for
/// flush emissions, which have no upstream transaction of their own.
async fn emit(
    msgs: Vec<Message>,
    origin: Option<ReplySender>,
    out_tx: &mpsc::Sender<Transaction>,
    deferred: &mut Vec<ReplySender>,
    token: &mut ShutdownToken,
    counters: &Counters,
) -> ControlFlow<()> {
    let mut replies = Vec::with_capacity(msgs.len());
    for msg in msgs {
        let permit = tokio::select! {
            _ = token.triggered() => None,
            permit = out_tx.reserve() => permit.ok(),
        };
        let Some(permit) = permit else {
            if let Some(origin) = origin {
                origin.send(Response::Error(Error::cancelled()));
            }
            return ControlFlow::Break(());
        };
        let (child, reply_rx) = Transaction::new(msg);
        permit.send(child);
        counters.sent.increment(1);
        replies.push(reply_rx);
    }

    let collected = tokio::select! {
        _ = token.triggered() => None,
        responses = join_all(replies.iter_mut().map(|rx| rx.recv())) => Some(responses),
    };
    let Some(responses) = collected else {
        if let Some(origin) = origin {
            origin.send(Response::Error(Error::cancelled()));
        }
        return ControlFlow::Break(());
    };

    // First error wins; a deferral anywhere defers the aggregate; otherwise
    // every child acknowledged.
    let mut first_error: Option<Error> = None;
    let mut skipped = false;
    for response in responses {
        match response {
            Some(Response::Ack) => {}
            Some(Response::SkipAck) => skipped = true,
            Some(Response::Error(err)) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            None => {
                if first_error.is_none() {
                    first_error = Some(Error::delivery("downstream dropped the reply channel"));
                }
            }
        }
    }

    match first_error {
        Some(err) => settle(Response::Error(err), origin, deferred),
        None if skipped => {
            // The downstream itself deferred; pass the deferral upstream.
            if let Some(origin) = origin {
                counters.deferred.increment(1);
                origin.send(Response::SkipAck);
                deferred.push(origin);
            }
        }
        None => settle(Response::Ack, origin, deferred),
    }
    ControlFlow::Continue(())
}

/// Delivers the covering response to every retained sink, then the origin.
fn settle(response: Response, origin: Option<ReplySender>, deferred: &mut Vec<ReplySender>) {
    for sink in deferred.drain(..) {
        sink.send(response.clone());
    }
    if let Some(origin) = origin {
        origin.send(response);
    }
}

/// On upstream close, flushes buffered processor state through the rest of
/// the chain so partial batches can still be delivered.
async fn drain(
    processors: &mut Vec<Box<dyn Processor>>,
    out_tx: &mpsc::Sender<Transaction>,
    deferred: &mut Vec<ReplySender>,
    token: &mut ShutdownToken,
    counters: &Counters,
) -> ControlFlow<()> {
    for i in 0..processors.len() {
        let (head, rest) = processors.split_at_mut(i + 1);
        let Some(flushed) = head[i].flush() else {
            continue;
        };
        match run_chain(rest, flushed) {
            ChainOutcome::Decided(_) => {}
            ChainOutcome::Emitted(msgs) if msgs.is_empty() => {}
            ChainOutcome::Emitted(msgs) => {
                emit(msgs, None, out_tx, deferred, token, counters).await?;
            }
        }
    }
    ControlFlow::Continue(())
}

fn cancel_deferred(deferred: &mut Vec<ReplySender>) {
    for sink in deferred.drain(..) {
        sink.send(Response::Error(Error::cancelled()));
    }
}

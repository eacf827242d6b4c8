use std::time::Duration;

use async_trait::async_trait;
use common::interface::Pipeline;
use common::{Input, Transaction};
use errors::{Error, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Deferred pipeline construction, so a failed constructor can be reported
/// before anything is spliced together.
pub type PipelineConstructor = Box<dyn FnOnce() -> Result<Box<dyn Pipeline>> + Send>;

/// Splices a single pipeline between `input` and its downstream.
pub fn wrap_with_pipeline(
    input: Box<dyn Input>,
    constructor: PipelineConstructor,
) -> Result<Box<dyn Input>> {
    wrap_with_pipelines(input, vec![constructor])
}

/// Splices the constructed pipelines between `input` and its downstream,
/// returning a composite input whose producer endpoint is the last
/// pipeline's. With zero constructors the input is returned unchanged. If a
/// constructor fails, the already-constructed pipelines are closed and the
/// error is returned.
pub fn wrap_with_pipelines(
    mut input: Box<dyn Input>,
    constructors: Vec<PipelineConstructor>,
) -> Result<Box<dyn Input>> {
    if constructors.is_empty() {
        return Ok(input);
    }

    let mut pipelines = Vec::with_capacity(constructors.len());
    for constructor in constructors {
        match constructor() {
            Ok(pipeline) => pipelines.push(pipeline),
            Err(err) => {
                for mut pipeline in pipelines {
                    pipeline.close_async();
                }
                return Err(err);
            }
        }
    }

    let mut transactions = input.transaction_chan().ok_or_else(Error::already_started)?;
    for pipeline in pipelines.iter_mut() {
        pipeline.consume(transactions)?;
        transactions = pipeline
            .transaction_chan()
            .ok_or_else(Error::already_started)?;
    }

    Ok(Box::new(WrappedInput {
        input,
        pipelines,
        transactions: Some(transactions),
    }))
}

/// Composite of an input and the pipelines spliced after it.
struct WrappedInput {
    input: Box<dyn Input>,
    pipelines: Vec<Box<dyn Pipeline>>,
    transactions: Option<mpsc::Receiver<Transaction>>,
}

#[async_trait]
impl Input for WrappedInput {
    fn transaction_chan(&mut self) -> Option<mpsc::Receiver<Transaction>> {
        self.transactions.take()
    }

    fn close_async(&mut self) {
        // Dependency order: the input stops producing first so in-flight
        // transactions always find a receiver.
        self.input.close_async();
        for pipeline in self.pipelines.iter_mut() {
            pipeline.close_async();
        }
    }

    async fn wait_for_close(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        self.input.wait_for_close(timeout).await?;
        for pipeline in self.pipelines.iter_mut() {
            pipeline
                .wait_for_close(deadline.saturating_duration_since(Instant::now()))
                .await?;
        }
        Ok(())
    }
}

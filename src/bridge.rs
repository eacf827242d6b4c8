use std::sync::Arc;
use std::time::Duration;

use common::interface::{Input, Output, Pipeline};
use common::Manager;
use errors::{Error, Result};
use input::PipelineConstructor;
use log::info;
use pipeline::ProcessorPipeline;
use tokio::time::Instant;

use crate::config::Config;

/// A full assembly: input, the processor pipelines configured on either
/// side, and output, connected with end-to-end acknowledgement.
pub struct Bridge {
    input: Box<dyn Input>,
    output: Box<dyn Output>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").finish_non_exhaustive()
    }
}

impl Bridge {
    /// Builds and connects every component described by `conf`. Construction
    /// errors surface here and nothing is left running.
    pub fn new(conf: &Config, manager: &Arc<Manager>) -> Result<Self> {
        let raw_input = input::construct(&conf.input, manager)?;

        // One pipeline per non-empty processor list, input side first.
        let mut constructors: Vec<PipelineConstructor> = Vec::new();
        for procs in [conf.input.processors.clone(), conf.output.processors.clone()] {
            if procs.is_empty() {
                continue;
            }
            let manager = manager.clone();
            constructors.push(Box::new(move || {
                let mut built = Vec::with_capacity(procs.len());
                for proc_conf in &procs {
                    built.push(processor::construct(proc_conf, &manager)?);
                }
                Ok(Box::new(ProcessorPipeline::new(built)) as Box<dyn Pipeline>)
            }));
        }

        let mut input = input::wrap_with_pipelines(raw_input, constructors)?;
        let mut output = output::construct(&conf.output, manager)?;

        let transactions = input
            .transaction_chan()
            .ok_or_else(Error::already_started)?;
        output.consume(transactions)?;

        info!(
            "bridge: connected input '{}' to output '{}'",
            conf.input.type_name, conf.output.type_name
        );
        Ok(Bridge { input, output })
    }

    /// Tears the assembly down in dependency order (input and pipelines
    /// first, output last) so in-flight transactions always find a receiver.
    /// The timeout spans the whole cascade.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        self.input.close_async();
        self.input
            .wait_for_close(deadline.saturating_duration_since(Instant::now()))
            .await?;

        self.output.close_async();
        self.output
            .wait_for_close(deadline.saturating_duration_since(Instant::now()))
            .await?;

        info!("bridge: closed");
        Ok(())
    }
}

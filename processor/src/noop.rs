use std::sync::Arc;

use common::{Manager, Message};
use errors::Result;

use crate::{Config, Processor, ProcessorOutput};

pub fn new_noop(_conf: &Config, _manager: &Arc<Manager>) -> Result<Box<dyn Processor>> {
    Ok(Box::new(Noop))
}

/// Emits every message unchanged.
pub struct Noop;

impl Processor for Noop {
    fn process(&mut self, msg: Message) -> ProcessorOutput {
        ProcessorOutput::Emit(vec![msg])
    }
}

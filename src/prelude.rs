// Common traits and structs.
pub use ::common::interface::{Input, Output, Pipeline};
pub use ::common::{Manager, Message, ReplyReceiver, ReplySender, Response, Transaction};

// Errors.
pub use ::errors::{BoxError, ConfigError, Error, ErrorKind, Result};

// Core components.
pub use ::input::{wrap_with_pipeline, wrap_with_pipelines, Preserver, Reader, ReaderInput};
pub use ::output::{Writer, WriterOutput};
pub use ::pipeline::ProcessorPipeline;
pub use ::processor::{Processor, ProcessorOutput};

// Assembly.
pub use crate::bridge::Bridge;
pub use crate::config::Config;

pub mod common {
    pub use ::common::interface::{Input, Output, Pipeline};
    pub use ::common::{Manager, Message, Response, Transaction};
}
pub mod input {
    pub use ::input::{InprocInput, Preserver, Reader, ReaderInput};
}
pub mod output {
    pub use ::output::{DropOutput, InprocOutput, Writer, WriterOutput};
}
pub mod processor {
    pub use ::processor::{BoundsCheck, Combine, InsertPart, Noop};
}
pub mod text {
    pub use ::utils::text::{contains_function_variables, replace_function_variables};
}

pub mod processor_pipeline;

pub use processor_pipeline::ProcessorPipeline;

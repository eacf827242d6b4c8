//! sluice: Unified entry point for the sluice workspace.
//! This crate re-exports the internal crates so consumers can
//! `use sluice::pipeline::...`, `sluice::common::...`, etc.

pub mod bridge;
pub mod config;
pub mod prelude;

pub mod common {
    pub use ::common::*;
}
pub mod errors {
    pub use ::errors::*;
}
pub mod input {
    pub use ::input::*;
}
pub mod output {
    pub use ::output::*;
}
pub mod pipeline {
    pub use ::pipeline::*;
}
pub mod processor {
    pub use ::processor::*;
}
pub mod utils {
    pub use ::utils::*;
}

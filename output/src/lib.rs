//! Transaction-consuming outputs and their constructor registry.

pub mod drop;
pub mod inproc;
pub mod writer;
pub mod writer_output;

pub use drop::DropOutput;
pub use inproc::{InprocConfig, InprocOutput};
pub use writer::Writer;
pub use writer_output::WriterOutput;

use std::sync::Arc;

use common::{Manager, Output};
use dashmap::DashMap;
use errors::{ConfigError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Discriminated output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "type")]
    pub type_name: String,
    pub inproc: InprocConfig,
    pub processors: Vec<processor::Config>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            type_name: "drop".to_string(),
            inproc: InprocConfig::default(),
            processors: Vec::new(),
        }
    }
}

pub type ConstructorFn = fn(&Config, &Arc<Manager>) -> Result<Box<dyn Output>>;

/// Constructor table entry.
#[derive(Clone, Copy)]
pub struct TypeSpec {
    pub constructor: ConstructorFn,
    pub description: &'static str,
}

/// Process-wide output registry; built-ins on first access, read-only after
/// process initialisation.
pub static CONSTRUCTORS: Lazy<DashMap<String, TypeSpec>> = Lazy::new(|| {
    let constructors = DashMap::new();
    constructors.insert(
        "inproc".to_string(),
        TypeSpec {
            constructor: inproc::new_inproc,
            description: "\
Sends transactions into a named in-process pipe for an inproc input within
the same process to consume. Acknowledgements travel back through the pipe
untouched.",
        },
    );
    constructors.insert(
        "drop".to_string(),
        TypeSpec {
            constructor: drop::new_drop,
            description: "\
Discards every message and acknowledges it upstream. Useful for draining a
stream or measuring everything before the output.",
        },
    );
    constructors
});

pub fn register(name: impl Into<String>, spec: TypeSpec) {
    CONSTRUCTORS.insert(name.into(), spec);
}

/// Builds the output selected by `conf.type_name`.
pub fn construct(conf: &Config, manager: &Arc<Manager>) -> Result<Box<dyn Output>> {
    match CONSTRUCTORS.get(conf.type_name.as_str()) {
        Some(spec) => (spec.constructor)(conf, manager),
        None => Err(ConfigError::UnknownType {
            kind: "output",
            name: conf.type_name.clone(),
        }
        .into()),
    }
}

pub fn registered_types() -> Vec<String> {
    let mut types: Vec<String> = CONSTRUCTORS.iter().map(|e| e.key().clone()).collect();
    types.sort();
    types
}

/// Reduces a fully-defaulted config to the fields relevant to the selected
/// type, keeping the processor list. Idempotent.
pub fn sanitise_config(conf: &Config) -> Result<serde_json::Value> {
    if !CONSTRUCTORS.contains_key(conf.type_name.as_str()) {
        return Err(ConfigError::UnknownType {
            kind: "output",
            name: conf.type_name.clone(),
        }
        .into());
    }

    let value = serde_json::to_value(conf).map_err(|e| ConfigError::Serialise(e.to_string()))?;
    let mut out = serde_json::Map::new();
    out.insert(
        "type".to_string(),
        serde_json::Value::String(conf.type_name.clone()),
    );
    if let Some(sub) = value.get(conf.type_name.as_str()) {
        out.insert(conf.type_name.clone(), sub.clone());
    }
    let mut processors = Vec::with_capacity(conf.processors.len());
    for proc_conf in &conf.processors {
        processors.push(processor::sanitise_config(proc_conf)?);
    }
    out.insert(
        "processors".to_string(),
        serde_json::Value::Array(processors),
    );
    Ok(serde_json::Value::Object(out))
}

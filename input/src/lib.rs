//! Transaction-producing inputs and their constructor registry.

pub mod inproc;
pub mod preserver;
pub mod reader;
pub mod reader_input;
pub mod wrap;

pub use inproc::{InprocConfig, InprocInput};
pub use preserver::Preserver;
pub use reader::Reader;
pub use reader_input::ReaderInput;
pub use wrap::{wrap_with_pipeline, wrap_with_pipelines, PipelineConstructor};

use std::sync::Arc;

use common::{Input, Manager};
use dashmap::DashMap;
use errors::{ConfigError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Discriminated input configuration.
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
            type_name: "inproc".to_string(),
            inproc: InprocConfig::default(),
            processors: Vec::new(),
        }
    }
}

pub type ConstructorFn = fn(&Config, &Arc<Manager>) -> Result<Box<dyn Input>>;

/// Constructor table entry.
#[derive(Clone, Copy)]
pub struct TypeSpec {
    pub constructor: ConstructorFn,
    pub description: &'static str,
}

/// Process-wide input registry; built-ins on first access, read-only after
/// process initialisation.
pub static CONSTRUCTORS: Lazy<DashMap<String, TypeSpec>> = Lazy::new(|| {
    let constructors = DashMap::new();
    constructors.insert(
        "inproc".to_string(),
        TypeSpec {
            constructor: inproc::new_inproc,
            description: "\
Receives transactions from a named in-process pipe, as fed by an inproc
output within the same process. Acknowledgements travel back through the
pipe untouched.",
        },
    );
    constructors
});

pub fn register(name: impl Into<String>, spec: TypeSpec) {
    CONSTRUCTORS.insert(name.into(), spec);
}

/// Builds the input selected by `conf.type_name`.
pub fn construct(conf: &Config, manager: &Arc<Manager>) -> Result<Box<dyn Input>> {
    match CONSTRUCTORS.get(conf.type_name.as_str()) {
        Some(spec) => (spec.constructor)(conf, manager),
        None => Err(ConfigError::UnknownType {
            kind: "input",
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
            kind: "input",
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_unknown_type() {
        let manager = Arc::new(Manager::new());
        let conf = Config {
            type_name: "amqp".to_string(),
            ..Config::default()
        };
        let err = construct(&conf, &manager).expect_err("unknown type");
        assert!(err.is_config());
    }

    #[test]
    fn test_sanitise_is_idempotent() {
        let conf = Config {
            processors: vec![processor::Config {
                type_name: "combine".to_string(),
                ..processor::Config::default()
            }],
            ..Config::default()
        };
        let first = sanitise_config(&conf).unwrap();
        let reparsed: Config = serde_json::from_value(first.clone()).unwrap();
        let second = sanitise_config(&reparsed).unwrap();
        assert_eq!(first, second);
    }
}

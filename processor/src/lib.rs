//! Message processors and their constructor registry.

pub mod bounds_check;
pub mod combine;
pub mod config;
pub mod insert_part;
pub mod noop;

pub use bounds_check::{BoundsCheck, BoundsCheckConfig};
pub use combine::{Combine, CombineConfig};
pub use config::Config;
pub use insert_part::{InsertPart, InsertPartConfig};
pub use noop::Noop;

use std::sync::Arc;

use common::{Manager, Message, Response};
use dashmap::DashMap;
use errors::{ConfigError, Result};
use once_cell::sync::Lazy;

/// What a processor did with a message: either zero or more messages to
/// carry forward, or a response to route straight back upstream.
#[derive(Debug)]
pub enum ProcessorOutput {
    Emit(Vec<Message>),
    Respond(Response),
}

/// A stepwise function over messages.
///
/// Processor state is only ever touched by the single pipeline task that
/// owns the processor, so implementations need no internal synchronisation.
pub trait Processor: Send {
    fn process(&mut self, msg: Message) -> ProcessorOutput;

    /// Surrenders any internally buffered state as a final message when the
    /// hosting pipeline drains. Stateless processors keep the default.
    fn flush(&mut self) -> Option<Message> {
        None
    }
}

impl std::fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Processor").finish_non_exhaustive()
    }
}

pub type ConstructorFn = fn(&Config, &Arc<Manager>) -> Result<Box<dyn Processor>>;

/// Constructor table entry.
#[derive(Clone, Copy)]
pub struct TypeSpec {
    pub constructor: ConstructorFn,
    pub description: &'static str,
}

/// Process-wide processor registry. Populated with the built-in types on
/// first access and read-only afterwards; [`register`] is for extension
/// during process initialisation, before any construction happens.
pub static CONSTRUCTORS: Lazy<DashMap<String, TypeSpec>> = Lazy::new(|| {
    let constructors = DashMap::new();
    constructors.insert(
        "bounds_check".to_string(),
        TypeSpec {
            constructor: bounds_check::new_bounds_check,
            description: "\
Checks whether each message fits within certain boundaries, and drops
messages that do not. A metric is incremented for each dropped message and
debug logs are also provided if enabled.",
        },
    );
    constructors.insert(
        "combine".to_string(),
        TypeSpec {
            constructor: combine::new_combine,
            description: "\
Squashes multiple messages back into a single multi-part message, emitting a
batch once a target number of parts is reached. The metadata of the
resulting batch matches the metadata of the last message to enter it.
Messages already carrying more parts than the target pass through unchanged,
which can reorder parts relative to the pending batch.",
        },
    );
    constructors.insert(
        "insert_part".to_string(),
        TypeSpec {
            constructor: insert_part::new_insert_part,
            description: "\
Inserts a new part into each message at a configured index. A negative index
counts from the end of the message (-1 appends). The content field supports
function variables.",
        },
    );
    constructors.insert(
        "noop".to_string(),
        TypeSpec {
            constructor: noop::new_noop,
            description: "Passes every message through unchanged.",
        },
    );
    constructors
});

pub fn register(name: impl Into<String>, spec: TypeSpec) {
    CONSTRUCTORS.insert(name.into(), spec);
}

/// Builds the processor selected by `conf.type_name`.
pub fn construct(conf: &Config, manager: &Arc<Manager>) -> Result<Box<dyn Processor>> {
    match CONSTRUCTORS.get(conf.type_name.as_str()) {
        Some(spec) => (spec.constructor)(conf, manager),
        None => Err(ConfigError::UnknownType {
            kind: "processor",
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
/// type. Idempotent; used for example-config generation.
pub fn sanitise_config(conf: &Config) -> Result<serde_json::Value> {
    if !CONSTRUCTORS.contains_key(conf.type_name.as_str()) {
        return Err(ConfigError::UnknownType {
            kind: "processor",
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
    Ok(serde_json::Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_unknown_type() {
        let manager = Arc::new(Manager::new());
        let conf = Config {
            type_name: "does_not_exist".to_string(),
            ..Config::default()
        };
        let err = construct(&conf, &manager).expect_err("unknown type");
        assert!(err.is_config());
        assert!(err.to_string().contains("does_not_exist"));
    }

    #[test]
    fn test_construct_builtins() {
        let manager = Arc::new(Manager::new());
        for name in registered_types() {
            let conf = Config {
                type_name: name.clone(),
                ..Config::default()
            };
            construct(&conf, &manager).unwrap_or_else(|e| panic!("construct {name}: {e}"));
        }
    }

    #[test]
    fn test_sanitise_retains_only_selected_type() {
        let conf = Config {
            type_name: "combine".to_string(),
            ..Config::default()
        };
        let sanitised = sanitise_config(&conf).unwrap();
        let obj = sanitised.as_object().unwrap();
        assert_eq!(obj.get("type").unwrap(), "combine");
        assert!(obj.contains_key("combine"));
        assert!(!obj.contains_key("bounds_check"));
        assert!(!obj.contains_key("insert_part"));
    }

    #[test]
    fn test_sanitise_is_idempotent() {
        for name in registered_types() {
            let conf = Config {
                type_name: name.clone(),
                ..Config::default()
            };
            let first = sanitise_config(&conf).unwrap();
            let reparsed: Config = serde_json::from_value(first.clone()).unwrap();
            let second = sanitise_config(&reparsed).unwrap();
            assert_eq!(first, second, "sanitise not idempotent for {name}");
        }
    }
}

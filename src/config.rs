use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use errors::Result;
use serde::{Deserialize, Serialize};

/// Top-level service configuration, expressible in both YAML and JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub input: input::Config,
    pub output: output::Config,
}

/// Listener settings for the admin HTTP surface. The server itself is an
/// external collaborator; only the shape of its configuration lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub address: String,
    pub path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            address: "0.0.0.0:4195".to_string(),
            path: "/sluice".to_string(),
        }
    }
}

impl Config {
    /// A copy with the unselected input/output/processor subrecords dropped.
    /// Idempotent; used for example-config generation.
    pub fn sanitised(&self) -> Result<serde_json::Value> {
        let mut out = serde_json::Map::new();
        out.insert(
            "http".to_string(),
            serde_json::to_value(&self.http)
                .map_err(|e| errors::ConfigError::Serialise(e.to_string()))?,
        );
        out.insert("input".to_string(), input::sanitise_config(&self.input)?);
        out.insert("output".to_string(), output::sanitise_config(&self.output)?);
        Ok(serde_json::Value::Object(out))
    }
}

/// Writes a sanitised example config for every registered input and output
/// type into `dir`, returning the written paths. A type name present in both
/// registries configures both ends of its example.
pub fn write_examples(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut type_names = BTreeSet::new();
    type_names.extend(input::registered_types());
    type_names.extend(output::registered_types());

    let mut written = Vec::with_capacity(type_names.len());
    for type_name in type_names {
        let mut conf = Config::default();
        if input::CONSTRUCTORS.contains_key(type_name.as_str()) {
            conf.input.type_name = type_name.clone();
        }
        if output::CONSTRUCTORS.contains_key(type_name.as_str()) {
            conf.output.type_name = type_name.clone();
        }

        let sanitised = conf.sanitised().map_err(std::io::Error::other)?;
        let mut contents = String::from("# This file was auto generated by sluice config_gen.\n");
        contents.push_str(&serde_yaml::to_string(&sanitised).map_err(std::io::Error::other)?);

        let path = dir.join(format!("{type_name}.yaml"));
        std::fs::write(&path, contents)?;
        written.push(path);
    }
    Ok(written)
}

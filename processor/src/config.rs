use serde::{Deserialize, Serialize};

use crate::bounds_check::BoundsCheckConfig;
use crate::combine::CombineConfig;
use crate::insert_part::InsertPartConfig;

/// Discriminated processor configuration: `type` names the active variant
/// and only the nested record of that name is consulted by the constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "type")]
    pub type_name: String,
    pub bounds_check: BoundsCheckConfig,
    pub combine: CombineConfig,
    pub insert_part: InsertPartConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            type_name: "noop".to_string(),
            bounds_check: BoundsCheckConfig::default(),
            combine: CombineConfig::default(),
            insert_part: InsertPartConfig::default(),
        }
    }
}

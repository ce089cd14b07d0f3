//! Interface and mapping descriptors. Interface descriptors
//! are static per tool class; mapping descriptors are per tool instance.
//! Parsing from YAML happens in `engine-tool`; these types are the shared
//! shape both the loader and the resolver agree on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One formal input of a tool class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(deserialize_with = "deserialize_bool_flag", default)]
    pub mandatory: bool,
}

fn deserialize_bool_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(i64),
        Bool(bool),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Int(n) => n != 0,
        Flag::Bool(b) => b,
    })
}

/// Build context for a tool's container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub context: String,
    pub tag: String,
}

/// Static, per-tool-class declaration: inputs and command template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub inputs: Vec<InputSpec>,
    pub command: Vec<String>,
    pub image: ImageSpec,
}

impl InterfaceDescriptor {
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }
}

/// A database query backing a dynamic provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicQuery {
    /// `"previous"`, an absolute node name, or absent for a free-form lookup.
    #[serde(default)]
    pub root: Option<String>,
    pub collection: String,
    #[serde(default)]
    pub filter: Option<serde_json::Map<String, serde_json::Value>>,
    pub projection: serde_json::Map<String, serde_json::Value>,
}

/// One entry in a mapping descriptor: how a single input is bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Provider {
    Static { value: serde_json::Value },
    Dynamic { query: DynamicQuery },
}

/// Per-instance declaration: input name -> Provider.
pub type MappingDescriptor = BTreeMap<String, Provider>;

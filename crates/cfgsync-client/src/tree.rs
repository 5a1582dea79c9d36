//! Configuration tree model
//!
//! A configuration tree is a nested mapping whose leaves are scalars or
//! sequences. The value kind is decided once, when the tree is deserialized,
//! so the codec never has to re-inspect loosely typed values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A nested configuration mapping, ordered by key.
pub type ConfigTree = BTreeMap<String, ConfigValue>;

/// A leaf value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

/// Any node of a configuration tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(Scalar),
    Sequence(Vec<ConfigValue>),
    Mapping(ConfigTree),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

impl ConfigValue {
    pub fn as_mapping(&self) -> Option<&ConfigTree> {
        match self {
            ConfigValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ConfigValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// True for a mapping with zero keys.
    pub fn is_empty_mapping(&self) -> bool {
        matches!(self, ConfigValue::Mapping(m) if m.is_empty())
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Scalar(Scalar::String(value))
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Scalar(Scalar::Number(value.into()))
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        ConfigValue::Sequence(value)
    }
}

impl From<ConfigTree> for ConfigValue {
    fn from(value: ConfigTree) -> Self {
        ConfigValue::Mapping(value)
    }
}

/// Returns a copy of `tree` with every empty nested mapping removed.
///
/// Children are sanitized first, so a mapping that only contained empty
/// mappings disappears as well. Sequence elements are sanitized but never
/// removed.
pub fn sanitize(tree: &ConfigTree) -> ConfigTree {
    let mut out = ConfigTree::new();
    for (key, value) in tree {
        let value = sanitize_value(value);
        if !value.is_empty_mapping() {
            out.insert(key.clone(), value);
        }
    }
    out
}

fn sanitize_value(value: &ConfigValue) -> ConfigValue {
    match value {
        ConfigValue::Mapping(m) => ConfigValue::Mapping(sanitize(m)),
        ConfigValue::Sequence(items) => {
            ConfigValue::Sequence(items.iter().map(sanitize_value).collect())
        }
        ConfigValue::Scalar(s) => ConfigValue::Scalar(s.clone()),
    }
}

//! Typed capability attributes.
//!
//! Capabilities advertise their facts as a flat attribute map. Values keep the
//! type they were declared with so filters can compare numbers numerically
//! and strings lexically, the same way a module runtime would when matching
//! requirements.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute holding the logical schema name a capability provides.
pub const ATTR_NAME: &str = "name";

/// Attribute pointing at the changelog file inside the providing module.
pub const ATTR_RESOURCE: &str = "resource";

/// Attribute name to value. Keys are unique and iterate in sorted order.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A single attribute value.
///
/// Serialized untagged, so JSON scalars and arrays map directly onto the
/// variants. Integers that overflow `i64` fall through to `Float`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Returns the string payload for `String` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Boolean(value) => write!(f, "{value}"),
            AttributeValue::Integer(value) => write!(f, "{value}"),
            AttributeValue::Float(value) => write!(f, "{value}"),
            AttributeValue::String(value) => f.write_str(value),
            AttributeValue::List(values) => {
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

/// Deserialize an attribute map, dropping entries whose value is `null`.
///
/// A null attribute carries no information for matching, so it is treated as
/// absent rather than rejected.
pub fn deserialize_attribute_map<'de, D>(deserializer: D) -> Result<AttributeMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Option<AttributeValue>> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect())
}

/// Build an attribute map from `(key, value)` pairs.
pub fn attribute_map<K, V, I>(pairs: I) -> AttributeMap
where
    K: Into<String>,
    V: Into<AttributeValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

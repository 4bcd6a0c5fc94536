//! Item records produced by the fetch phase

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key of the synthetic attribute holding the number of real attributes
pub const TRAIT_COUNT_KEY: &str = "__count";

/// Display label for [`TRAIT_COUNT_KEY`]
pub const TRAIT_COUNT_LABEL: &str = "Trait Count";

/// Attributes in source order, synthetic count last
pub type AttributeMap = IndexMap<String, AttributeInstance>;

/// One attribute value held by an item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeInstance {
    pub value: Value,
}

impl AttributeInstance {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Layer table key for this value
    pub fn value_key(&self) -> String {
        value_key(&self.value)
    }
}

/// Canonical text form of an attribute value.
///
/// Strings are used verbatim, every other value by its JSON text, so the
/// string `"5"` and the number `5` count as the same value.
pub fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Display name for an attribute key
pub fn attribute_label(key: &str) -> &str {
    if key == TRAIT_COUNT_KEY {
        TRAIT_COUNT_LABEL
    } else {
        key
    }
}

/// Descriptive record of one collection item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    pub id: u64,
    pub name: String,
    pub image: String,
    pub attributes: AttributeMap,
}

impl ItemRecord {
    /// Number of attributes reported by the source (synthetic count excluded)
    pub fn real_attribute_count(&self) -> usize {
        self.attributes
            .keys()
            .filter(|key| key.as_str() != TRAIT_COUNT_KEY)
            .count()
    }
}

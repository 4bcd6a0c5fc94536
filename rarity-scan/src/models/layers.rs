//! Attribute layer table: occurrence counts per (attribute, value)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Frequency counters keyed by attribute name, then value key
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LayerTable {
    layers: BTreeMap<String, BTreeMap<String, u64>>,
}

impl LayerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `value_key` under `attribute`, returning the new count
    pub fn increment(&mut self, attribute: &str, value_key: &str) -> u64 {
        let count = self
            .layers
            .entry(attribute.to_string())
            .or_default()
            .entry(value_key.to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Occurrences of `value_key` under `attribute` (0 when never seen)
    pub fn count(&self, attribute: &str, value_key: &str) -> u64 {
        self.layers
            .get(attribute)
            .and_then(|values| values.get(value_key))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.layers
            .values()
            .flat_map(|values| values.values())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

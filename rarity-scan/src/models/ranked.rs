//! Ranking-pass output

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute instance with its frequency statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredAttribute {
    pub value: Value,
    /// Items in the collection sharing this (attribute, value) pair
    pub occurrences: u64,
    /// Inverse relative frequency: `1 / (occurrences / total_items)`
    pub score: f64,
}

/// Item with its rarity score and rank
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedItem {
    pub id: u64,
    pub name: String,
    pub image: String,
    pub attributes: IndexMap<String, ScoredAttribute>,
    /// Sum of attribute occurrences
    pub occurrences: u64,
    /// Sum of attribute scores
    pub score: f64,
    /// 1-based; ties share the position of the first item in their group
    pub rank: usize,
}

/// Items ordered by descending score
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RankedDataset {
    pub items: Vec<RankedItem>,
    pub total_attribute_instances: u64,
}

impl RankedDataset {
    /// Number of ranked items (the score denominator)
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item by id
    pub fn get(&self, id: u64) -> Option<&RankedItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

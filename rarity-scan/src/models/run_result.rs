//! Fetch-phase output: item records plus the layer table built from them

use serde::{Deserialize, Serialize};

use super::{ItemRecord, LayerTable};
use crate::services::scheduler::RunSink;

/// Everything the ranking pass needs; also the persisted cache document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    /// Records in fetch completion order
    pub items: Vec<ItemRecord>,
    pub layers: LayerTable,
    /// Sum over items of (real attributes + 1)
    pub total_attribute_instances: u64,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the layer table and totals from a list of records
    pub fn from_items(items: Vec<ItemRecord>) -> Self {
        let mut result = Self::new();
        for item in items {
            result.absorb(item);
        }
        result
    }

    /// Fold one record into the layer table and append it.
    ///
    /// Every attribute instance, synthetic count included, bumps its
    /// (attribute, value) counter and the instance total exactly once.
    pub fn absorb(&mut self, record: ItemRecord) {
        for (attribute, instance) in &record.attributes {
            self.layers.increment(attribute, &instance.value_key());
            self.total_attribute_instances += 1;
        }
        self.items.push(record);
    }

    /// Whether the layer table and total agree with the records
    pub fn is_consistent(&self) -> bool {
        let rebuilt = Self::from_items(self.items.clone());
        rebuilt.layers == self.layers
            && rebuilt.total_attribute_instances == self.total_attribute_instances
    }

    /// Return a copy whose counters are recomputed from the records when they disagree
    pub fn into_consistent(self) -> Self {
        if self.is_consistent() {
            return self;
        }

        tracing::warn!(
            items = self.items.len(),
            stored_total = self.total_attribute_instances,
            "Stored layer table disagrees with its records, rebuilding"
        );
        Self::from_items(self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl RunSink<Option<ItemRecord>> for RunResult {
    fn accept(&mut self, id: u64, output: Option<ItemRecord>) {
        match output {
            Some(record) => self.absorb(record),
            None => tracing::debug!(id, "Item has no attribute list, skipped"),
        }
    }
}

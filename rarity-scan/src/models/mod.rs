//! Data models for collection scans

pub mod item;
pub mod layers;
pub mod ranked;
pub mod run_result;

pub use item::{
    attribute_label, value_key, AttributeInstance, AttributeMap, ItemRecord, TRAIT_COUNT_KEY,
    TRAIT_COUNT_LABEL,
};
pub use layers::LayerTable;
pub use ranked::{RankedDataset, RankedItem, ScoredAttribute};
pub use run_result::RunResult;

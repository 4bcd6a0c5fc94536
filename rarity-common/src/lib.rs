//! # Rarity Common Library
//!
//! Shared code for the rarity scanner crates:
//! - Error type
//! - Configuration loading (TOML bootstrap + environment overrides)
//! - Scan event types and the broadcast event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, ScanEvent};

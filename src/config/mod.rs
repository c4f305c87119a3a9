//! Configuration module for batch harvesting runs
//!
//! This module provides the `HarvestConfig` struct and its type-safe builder
//! for configuring runs with validation and sensible defaults.

pub mod builder;
pub mod getters;
pub mod types;

pub use builder::{HarvestConfigBuilder, WithDataDir};
pub use types::HarvestConfig;

//! Market Curator - market-data ingestion, caching and batch import
//!
//! This library polls pluggable upstream sources for quotes, news and bars,
//! keeps a TTL-bound hot cache, persists everything through a store trait
//! and bulk-imports tabular batch files.

pub mod api;
pub mod bus;
pub mod config;
pub mod constants;
pub mod curator;
pub mod data;
pub mod error;
pub mod events;
pub mod services;
pub mod sources;

// Re-export commonly used types
pub use bus::EventBus;
pub use config::CuratorConfig;
pub use curator::{Curator, StatsSnapshot};
pub use error::{CuratorError, CuratorResult};
pub use events::CuratorEvent;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod testing;

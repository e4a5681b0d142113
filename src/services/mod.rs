pub mod importer;
pub mod ingestion;
pub mod normalize;
pub mod stats;
pub mod watchlist;
pub mod worker;

pub use importer::{BatchImporter, DataType, EntityImportStats, ImportStats};
pub use ingestion::IngestionEngine;
pub use stats::{HealthThresholds, StatsTracker};
pub use watchlist::Watchlist;
pub use worker::{BackgroundWorker, WorkerSettings, WorkerState};

#[cfg(test)]
mod ingestion_tests;

//! Application-wide constants and default values
//!
//! This module centralizes hardcoded values so defaults and counter names
//! stay consistent between config, services and the HTTP surface.

use std::time::Duration;

/// Cache defaults
pub mod cache {
    /// Quote cache TTL (seconds)
    pub const DEFAULT_TTL_SECS: u64 = 300;
}

/// Background worker defaults
pub mod worker {
    use super::*;

    /// Interval between ticks (seconds)
    pub const DEFAULT_INTERVAL_SECS: u64 = 60;

    /// Tickers refreshed concurrently within one tick (1 = sequential)
    pub const DEFAULT_MAX_CONCURRENCY: usize = 1;

    /// Articles requested by the periodic news sweep
    pub const DEFAULT_NEWS_LIMIT: usize = 20;

    /// Run the news sweep every N ticks
    pub const DEFAULT_NEWS_EVERY_TICKS: u64 = 1;

    /// Back-to-back overruns at or above this count are logged as warnings
    pub const OVERRUN_WARN_STREAK: u32 = 2;

    /// Smallest accepted tick interval
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);
}

/// Source health thresholds
pub mod health {
    /// Consecutive errors before a source is marked degraded
    pub const DEFAULT_DEGRADED_AFTER: u32 = 3;

    /// Consecutive errors before a source is marked down
    pub const DEFAULT_DOWN_AFTER: u32 = 10;
}

/// Batch import defaults
pub mod import {
    /// Rows per store flush
    pub const DEFAULT_CHUNK_SIZE: usize = 1000;

    /// Files read per multi-file run
    pub const DEFAULT_MAX_FILES: usize = 100;

    /// Source label applied to imported rows without a source column
    pub const DEFAULT_SOURCE: &str = "batch_import";
}

/// HTTP source defaults
pub mod source {
    /// Request timeout for the HTTP adapter (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
}

/// Counter names used by the stats tracker
pub mod stats {
    pub const QUOTES_FETCHED: &str = "quotes_fetched";
    pub const QUOTES_PERSISTED: &str = "quotes_persisted";
    pub const QUOTES_DUPLICATE: &str = "quotes_duplicate";
    pub const NEWS_FETCHED: &str = "news_fetched";
    pub const NEWS_PERSISTED: &str = "news_persisted";
    pub const BARS_FETCHED: &str = "bars_fetched";
    pub const BARS_PERSISTED: &str = "bars_persisted";
    pub const CACHE_HITS: &str = "cache_hits";
    pub const CACHE_MISSES: &str = "cache_misses";
    pub const FETCH_FAILURES: &str = "fetch_failures";
    pub const PERSIST_FAILURES: &str = "persist_failures";
    pub const WORKER_TICKS: &str = "worker_ticks";
    pub const WORKER_OVERRUNS: &str = "worker_overruns";
    pub const WORKER_SKIPPED_TICKS: &str = "worker_skipped_ticks";
    pub const BATCHES_IMPORTED: &str = "batches_imported";
    pub const BATCH_IMPORT_FAILURES: &str = "batch_import_failures";
    pub const QUOTES_IMPORTED: &str = "quotes_imported";
    pub const OHLCV_IMPORTED: &str = "ohlcv_imported";
    pub const NEWS_IMPORTED: &str = "news_imported";
    pub const IMPORT_DUPLICATES: &str = "import_duplicates";
    pub const IMPORT_VALIDATION_FAILURES: &str = "import_validation_failures";
    pub const IMPORT_PERSIST_FAILURES: &str = "import_persist_failures";

    /// Every counter known at startup, reported as zero until first incremented
    pub const ALL: &[&str] = &[
        QUOTES_FETCHED,
        QUOTES_PERSISTED,
        QUOTES_DUPLICATE,
        NEWS_FETCHED,
        NEWS_PERSISTED,
        BARS_FETCHED,
        BARS_PERSISTED,
        CACHE_HITS,
        CACHE_MISSES,
        FETCH_FAILURES,
        PERSIST_FAILURES,
        WORKER_TICKS,
        WORKER_OVERRUNS,
        WORKER_SKIPPED_TICKS,
        BATCHES_IMPORTED,
        BATCH_IMPORT_FAILURES,
        QUOTES_IMPORTED,
        OHLCV_IMPORTED,
        NEWS_IMPORTED,
        IMPORT_DUPLICATES,
        IMPORT_VALIDATION_FAILURES,
        IMPORT_PERSIST_FAILURES,
    ];
}

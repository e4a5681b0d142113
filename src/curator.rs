//! The single owning instance: config, sources, store, cache, watchlist,
//! stats, the ingestion engine, the importer and the background worker.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::config::CuratorConfig;
use crate::data::batch::{Batch, BatchSource, JsonDirSource};
use crate::data::cache::QuoteCache;
use crate::data::store::DataStore;
use crate::data::types::{Bar, BarInterval, HistoryPeriod, NewsArticle, Quote, SourceHealthRecord};
use crate::error::{CuratorError, CuratorResult};
use crate::events::CuratorEvent;
use crate::services::importer::{BatchImporter, DataType, ImportStats};
use crate::services::ingestion::IngestionEngine;
use crate::services::stats::{HealthThresholds, StatsTracker};
use crate::services::watchlist::Watchlist;
use crate::services::worker::{BackgroundWorker, WorkerSettings, WorkerState};
use crate::sources::factory::build_sources;
use crate::sources::traits::SourceAdapter;

const EVENT_BUS_CAPACITY: usize = 1024;

/// Counters plus derived fields, serialized as one flat JSON object.
#[derive(Clone, Debug, Serialize)]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub counters: BTreeMap<String, u64>,
    pub watchlist_size: usize,
    pub cache_size: usize,
    pub worker_running: bool,
    pub source_count: usize,
    pub session_id: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub store: &'static str,
    pub store_healthy: bool,
    pub worker: WorkerState,
    pub sources: Vec<SourceHealthRecord>,
}

pub struct Curator {
    config: CuratorConfig,
    session_id: Uuid,
    bus: EventBus,
    stats: Arc<StatsTracker>,
    watchlist: Watchlist,
    engine: Arc<IngestionEngine>,
    importer: BatchImporter,
    worker: BackgroundWorker,
}

impl Curator {
    /// `sources` must already be in priority order.
    pub fn new(
        config: CuratorConfig,
        sources: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn DataStore>,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let bus = EventBus::new(EVENT_BUS_CAPACITY);
        let stats = Arc::new(StatsTracker::new(HealthThresholds::from(&config.health)));
        let watchlist = Watchlist::with_tickers(&config.watchlist);
        let cache = QuoteCache::new(config.cache_ttl());

        let engine = Arc::new(IngestionEngine::new(
            sources,
            cache,
            store.clone(),
            stats.clone(),
            bus.clone(),
        ));
        let importer = BatchImporter::from_config(store, stats.clone(), bus.clone(), &config.import);
        let worker = BackgroundWorker::new(
            engine.clone(),
            watchlist.clone(),
            WorkerSettings::from(&config.worker),
        );

        info!(
            "🗂️ [CURATOR] Session {} | {} sources | {} watched | cache ttl {:?}",
            session_id,
            engine.sources().len(),
            watchlist.len(),
            config.cache_ttl()
        );

        Self {
            config,
            session_id,
            bus,
            stats,
            watchlist,
            engine,
            importer,
            worker,
        }
    }

    /// Builds the configured sources and wires them to `store`.
    pub fn from_config(config: CuratorConfig, store: Arc<dyn DataStore>) -> CuratorResult<Self> {
        let sources = build_sources(&config.sources)?;
        Ok(Self::new(config, sources, store))
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn engine(&self) -> &Arc<IngestionEngine> {
        &self.engine
    }

    pub fn importer(&self) -> &BatchImporter {
        &self.importer
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CuratorEvent> {
        self.bus.subscribe()
    }

    // --- worker lifecycle ---

    /// Starts polling at the configured interval.
    pub fn start_worker(&self) -> bool {
        self.worker.start(self.config.worker.interval())
    }

    pub fn start_worker_with(&self, interval: Duration) -> bool {
        self.worker.start(interval)
    }

    pub async fn stop_worker(&self) -> bool {
        self.worker.stop().await
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Stops the worker and drops cached quotes. The store is left alone.
    pub async fn dispose(&self) {
        self.worker.stop().await;
        self.engine.cache().clear();
        info!("🗂️ [CURATOR] Session {} disposed", self.session_id);
    }

    // --- quotes ---

    pub async fn get_quote(&self, ticker: &str) -> CuratorResult<Quote> {
        self.engine.get_quote(ticker).await
    }

    pub async fn get_quotes(&self, tickers: &[String]) -> HashMap<String, Quote> {
        self.engine.get_quotes(tickers).await
    }

    pub async fn fetch_quote(&self, ticker: &str) -> CuratorResult<Quote> {
        self.engine.fetch_quote(ticker).await
    }

    pub async fn refresh_quote(&self, ticker: &str) -> CuratorResult<Quote> {
        self.engine.refresh_and_persist(ticker).await
    }

    /// Latest persisted quote, without touching the sources.
    pub async fn latest_stored_quote(&self, ticker: &str) -> CuratorResult<Option<Quote>> {
        Ok(self.engine.store().latest_quote(ticker).await?)
    }

    pub fn clear_cache(&self) {
        self.engine.cache().clear();
    }

    // --- watchlist ---

    pub fn watch(&self, ticker: &str) -> bool {
        self.watchlist.add(ticker)
    }

    pub fn unwatch(&self, ticker: &str) -> bool {
        self.watchlist.remove(ticker)
    }

    pub fn watchlist(&self) -> Vec<String> {
        self.watchlist.list()
    }

    // --- news and bars ---

    pub async fn fetch_news(&self, ticker: Option<&str>, limit: usize) -> CuratorResult<Vec<NewsArticle>> {
        self.engine.fetch_news(ticker, limit).await
    }

    /// Newest persisted articles, optionally for one ticker.
    pub async fn recent_news(&self, ticker: Option<&str>, limit: usize) -> CuratorResult<Vec<NewsArticle>> {
        Ok(self.engine.store().recent_news(ticker, limit).await?)
    }

    pub async fn fetch_historical(
        &self,
        ticker: &str,
        period: HistoryPeriod,
        interval: BarInterval,
    ) -> CuratorResult<Vec<Bar>> {
        self.engine.fetch_historical(ticker, period, interval).await
    }

    pub async fn get_ohlcv(&self, ticker: &str, interval: BarInterval, limit: usize) -> CuratorResult<Vec<Bar>> {
        Ok(self.engine.store().query_bars(ticker, interval, limit).await?)
    }

    // --- import ---

    pub async fn import_batch(&self, batch: &Batch, declared: DataType) -> CuratorResult<ImportStats> {
        self.importer
            .import_batch(batch, declared, self.config.import.deduplicate)
            .await
    }

    pub async fn import_from_source(
        &self,
        source: &dyn BatchSource,
        prefix: &str,
        declared: DataType,
    ) -> CuratorResult<ImportStats> {
        self.importer
            .import_from_source(
                source,
                prefix,
                declared,
                self.config.import.deduplicate,
                self.config.import.max_files,
            )
            .await
    }

    /// Imports from the configured `import.batch_dir`.
    pub async fn import_from_batch_dir(&self, prefix: &str, declared: DataType) -> CuratorResult<ImportStats> {
        let dir = self.config.import.batch_dir.clone().ok_or_else(|| {
            CuratorError::Configuration("import.batch_dir is not configured".to_string())
        })?;
        self.import_from_source(&JsonDirSource::new(dir), prefix, declared)
            .await
    }

    // --- stats and health ---

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            counters: self.stats.snapshot(),
            watchlist_size: self.watchlist.len(),
            cache_size: self.engine.cache().len(),
            worker_running: self.worker.is_running(),
            source_count: self.engine.sources().len(),
            session_id: self.session_id.to_string(),
        }
    }

    pub fn source_health(&self, source: &str) -> Option<SourceHealthRecord> {
        self.stats.source_health(source)
    }

    pub async fn is_healthy(&self) -> bool {
        self.stats.overall_healthy(self.engine.store().as_ref()).await
    }

    pub async fn health(&self) -> HealthReport {
        let store = self.engine.store();
        let store_healthy = store.health_check().await;
        HealthReport {
            healthy: self.stats.healthy_with_store(store_healthy),
            store: store.name(),
            store_healthy,
            worker: self.worker.state(),
            sources: self.stats.all_source_health(),
        }
    }
}

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::config::ImportConfig;
use crate::constants::stats;
use crate::data::batch::{Batch, BatchSource, Row};
use crate::data::store::DataStore;
use crate::data::types::{Bar, BarKey, NewsArticle, NewsKey, Quote, QuoteKey};
use crate::error::{CuratorError, CuratorResult, StoreResult};
use crate::events::CuratorEvent;

use super::normalize::{self, CLOSE, HEADLINE, HIGH, LOW, OPEN, PRICE, TIMESTAMP, VOLUME};
use super::stats::StatsTracker;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Quotes,
    Ohlcv,
    News,
    Auto,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Quotes => "quotes",
            DataType::Ohlcv => "ohlcv",
            DataType::News => "news",
            DataType::Auto => "auto",
        };
        f.write_str(s)
    }
}

impl FromStr for DataType {
    type Err = CuratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quotes" | "quote" => Ok(DataType::Quotes),
            "ohlcv" | "bars" => Ok(DataType::Ohlcv),
            "news" => Ok(DataType::News),
            "auto" | "" => Ok(DataType::Auto),
            other => Err(CuratorError::Configuration(format!(
                "unknown data type '{}' (expected quotes|ohlcv|news|auto)",
                other
            ))),
        }
    }
}

/// Works out a batch's entity type from the union of its column names.
pub fn detect_type(columns: &BTreeSet<String>) -> CuratorResult<DataType> {
    let has_any = |aliases: &[&str]| aliases.iter().any(|a| columns.contains(*a));

    let mut matches = Vec::new();
    if has_any(PRICE) && has_any(VOLUME) && has_any(TIMESTAMP) {
        matches.push(DataType::Quotes);
    }
    if has_any(OPEN) && has_any(HIGH) && has_any(LOW) && has_any(CLOSE) {
        matches.push(DataType::Ohlcv);
    }
    if has_any(HEADLINE) {
        matches.push(DataType::News);
    }

    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(CuratorError::Configuration(format!(
            "cannot detect data type from columns {:?}",
            columns
        ))),
        many => Err(CuratorError::Configuration(format!(
            "ambiguous columns {:?} match {:?}",
            columns, many
        ))),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntityImportStats {
    pub imported: usize,
    pub skipped_duplicate: usize,
    pub validation_failed: usize,
    pub persist_failed: usize,
}

impl EntityImportStats {
    pub fn merge(&mut self, other: &EntityImportStats) {
        self.imported += other.imported;
        self.skipped_duplicate += other.skipped_duplicate;
        self.validation_failed += other.validation_failed;
        self.persist_failed += other.persist_failed;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub quotes: EntityImportStats,
    pub ohlcv: EntityImportStats,
    pub news: EntityImportStats,
    pub batches_processed: usize,
    pub batches_failed: usize,
}

impl ImportStats {
    pub fn merge(&mut self, other: &ImportStats) {
        self.quotes.merge(&other.quotes);
        self.ohlcv.merge(&other.ohlcv);
        self.news.merge(&other.news);
        self.batches_processed += other.batches_processed;
        self.batches_failed += other.batches_failed;
    }

    pub fn imported(&self) -> usize {
        self.quotes.imported + self.ohlcv.imported + self.news.imported
    }
}

/// A record the importer can dedup and flush in bulk.
#[async_trait]
trait Importable: Sized + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Send + Sync;

    fn natural_key(&self) -> Self::Key;

    async fn existing_keys(store: &dyn DataStore, keys: &[Self::Key]) -> StoreResult<HashSet<Self::Key>>;

    async fn insert_chunk(store: &dyn DataStore, chunk: &[Self]) -> StoreResult<usize>;
}

#[async_trait]
impl Importable for Quote {
    type Key = QuoteKey;

    fn natural_key(&self) -> QuoteKey {
        self.key()
    }

    async fn existing_keys(store: &dyn DataStore, keys: &[QuoteKey]) -> StoreResult<HashSet<QuoteKey>> {
        store.existing_quote_keys(keys).await
    }

    async fn insert_chunk(store: &dyn DataStore, chunk: &[Quote]) -> StoreResult<usize> {
        store.insert_quotes(chunk).await
    }
}

#[async_trait]
impl Importable for Bar {
    type Key = BarKey;

    fn natural_key(&self) -> BarKey {
        self.key()
    }

    async fn existing_keys(store: &dyn DataStore, keys: &[BarKey]) -> StoreResult<HashSet<BarKey>> {
        store.existing_bar_keys(keys).await
    }

    async fn insert_chunk(store: &dyn DataStore, chunk: &[Bar]) -> StoreResult<usize> {
        store.insert_bars(chunk).await
    }
}

#[async_trait]
impl Importable for NewsArticle {
    type Key = NewsKey;

    fn natural_key(&self) -> NewsKey {
        self.key()
    }

    async fn existing_keys(store: &dyn DataStore, keys: &[NewsKey]) -> StoreResult<HashSet<NewsKey>> {
        store.existing_news_keys(keys).await
    }

    async fn insert_chunk(store: &dyn DataStore, chunk: &[NewsArticle]) -> StoreResult<usize> {
        store.insert_news_batch(chunk).await
    }
}

/// Bulk ETL from tabular batches into the store. Bypasses the quote cache.
pub struct BatchImporter {
    store: Arc<dyn DataStore>,
    stats: Arc<StatsTracker>,
    bus: EventBus,
    chunk_size: usize,
}

impl BatchImporter {
    pub fn new(store: Arc<dyn DataStore>, stats: Arc<StatsTracker>, bus: EventBus, chunk_size: usize) -> Self {
        Self {
            store,
            stats,
            bus,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn from_config(
        store: Arc<dyn DataStore>,
        stats: Arc<StatsTracker>,
        bus: EventBus,
        config: &ImportConfig,
    ) -> Self {
        Self::new(store, stats, bus, config.chunk_size)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Imports one batch. Bad rows and failed chunks are counted, never fatal;
    /// only an empty batch or an undetectable type fails the whole batch.
    pub async fn import_batch(
        &self,
        batch: &Batch,
        declared: DataType,
        deduplicate: bool,
    ) -> CuratorResult<ImportStats> {
        match self.import_rows(batch, declared, deduplicate).await {
            Ok(result) => {
                self.record(&result);
                info!(
                    "📥 [IMPORT] {}: {} imported, {} duplicate, {} invalid, {} persist-failed",
                    batch.name,
                    result.imported(),
                    result.quotes.skipped_duplicate + result.ohlcv.skipped_duplicate + result.news.skipped_duplicate,
                    result.quotes.validation_failed + result.ohlcv.validation_failed + result.news.validation_failed,
                    result.quotes.persist_failed + result.ohlcv.persist_failed + result.news.persist_failed,
                );
                self.bus.emit(CuratorEvent::ImportCompleted {
                    batch: batch.name.clone(),
                    stats: result.clone(),
                });
                Ok(result)
            }
            Err(e) => {
                self.stats.increment(stats::BATCH_IMPORT_FAILURES);
                error!("❌ [IMPORT] {} rejected: {}", batch.name, e);
                Err(e)
            }
        }
    }

    /// Multi-file run. A failing batch is counted and the run moves on.
    pub async fn import_batches(
        &self,
        batches: &[Batch],
        declared: DataType,
        deduplicate: bool,
    ) -> ImportStats {
        let mut total = ImportStats::default();
        for batch in batches {
            match self.import_batch(batch, declared, deduplicate).await {
                Ok(result) => total.merge(&result),
                Err(_) => total.batches_failed += 1,
            }
        }
        total
    }

    /// Lists up to `max_files` keys under `prefix` and imports them in order.
    /// Unreadable files count as failed batches.
    pub async fn import_from_source(
        &self,
        source: &dyn BatchSource,
        prefix: &str,
        declared: DataType,
        deduplicate: bool,
        max_files: usize,
    ) -> CuratorResult<ImportStats> {
        let keys = source.list(prefix).await?;
        if keys.len() > max_files {
            warn!(
                "⚠️ [IMPORT] {} files under '{}' in {}, importing the first {}",
                keys.len(),
                prefix,
                source.name(),
                max_files
            );
        }

        let mut total = ImportStats::default();
        for key in keys.into_iter().take(max_files) {
            let batch = match source.read(&key).await {
                Ok(batch) => batch,
                Err(e) => {
                    self.stats.increment(stats::BATCH_IMPORT_FAILURES);
                    error!("❌ [IMPORT] cannot read {}: {}", key, e);
                    total.batches_failed += 1;
                    continue;
                }
            };
            match self.import_batch(&batch, declared, deduplicate).await {
                Ok(result) => total.merge(&result),
                Err(_) => total.batches_failed += 1,
            }
        }
        info!(
            "📥 [IMPORT] {} run over '{}': {} batches ok, {} failed, {} rows imported",
            source.name(),
            prefix,
            total.batches_processed,
            total.batches_failed,
            total.imported()
        );
        Ok(total)
    }

    async fn import_rows(
        &self,
        batch: &Batch,
        declared: DataType,
        deduplicate: bool,
    ) -> CuratorResult<ImportStats> {
        if batch.is_empty() {
            return Err(CuratorError::Validation(format!("batch {} is empty", batch.name)));
        }
        let data_type = match declared {
            DataType::Auto => detect_type(&batch.columns())?,
            explicit => explicit,
        };
        debug!("[IMPORT] {} as {} ({} rows)", batch.name, data_type, batch.rows.len());

        let mut result = ImportStats {
            batches_processed: 1,
            ..ImportStats::default()
        };
        match data_type {
            DataType::Quotes => {
                let quotes = self.normalize_rows(batch, &mut result.quotes, |r| {
                    normalize::quote_from_row(r, &batch.name)
                });
                self.persist(quotes, deduplicate, &mut result.quotes).await;
            }
            DataType::Ohlcv => {
                let bars = self.normalize_rows(batch, &mut result.ohlcv, normalize::bar_from_row);
                self.persist(bars, deduplicate, &mut result.ohlcv).await;
            }
            DataType::News => {
                let articles = self.normalize_rows(batch, &mut result.news, |r| {
                    normalize::article_from_row(r, &batch.name)
                });
                self.persist(articles, deduplicate, &mut result.news).await;
            }
            DataType::Auto => {
                return Err(CuratorError::Configuration(format!(
                    "data type for {} left unresolved",
                    batch.name
                )))
            }
        }
        Ok(result)
    }

    fn normalize_rows<T>(
        &self,
        batch: &Batch,
        out: &mut EntityImportStats,
        parse: impl Fn(&Row) -> Result<T, String>,
    ) -> Vec<T> {
        let mut records = Vec::with_capacity(batch.rows.len());
        for (idx, row) in batch.rows.iter().enumerate() {
            match parse(row) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    out.validation_failed += 1;
                    debug!("[IMPORT] {} row {} dropped: {}", batch.name, idx, reason);
                }
            }
        }
        records
    }

    async fn persist<T: Importable>(&self, records: Vec<T>, deduplicate: bool, out: &mut EntityImportStats) {
        let records = if deduplicate {
            self.drop_duplicates(records, out).await
        } else {
            records
        };

        for chunk in records.chunks(self.chunk_size) {
            match T::insert_chunk(self.store.as_ref(), chunk).await {
                Ok(inserted) => {
                    out.imported += inserted;
                    // Conflicts the store swallowed are duplicates too
                    out.skipped_duplicate += chunk.len().saturating_sub(inserted);
                }
                Err(e) => {
                    out.persist_failed += chunk.len();
                    warn!("⚠️ [IMPORT] chunk of {} rows failed: {}", chunk.len(), e);
                }
            }
        }
    }

    /// Drops intra-batch repeats, then keys the store already holds (one lookup).
    async fn drop_duplicates<T: Importable>(&self, records: Vec<T>, out: &mut EntityImportStats) -> Vec<T> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());
        for record in records {
            if seen.insert(record.natural_key()) {
                unique.push(record);
            } else {
                out.skipped_duplicate += 1;
            }
        }
        if unique.is_empty() {
            return unique;
        }

        let keys: Vec<T::Key> = unique.iter().map(|r| r.natural_key()).collect();
        let existing = match T::existing_keys(self.store.as_ref(), &keys).await {
            Ok(existing) => existing,
            Err(e) => {
                // Natural-key conflicts in the store still catch what this misses
                warn!("⚠️ [IMPORT] duplicate lookup failed, relying on store conflicts: {}", e);
                return unique;
            }
        };
        if existing.is_empty() {
            return unique;
        }

        let before = unique.len();
        let fresh: Vec<T> = unique
            .into_iter()
            .filter(|r| !existing.contains(&r.natural_key()))
            .collect();
        out.skipped_duplicate += before - fresh.len();
        fresh
    }

    fn record(&self, result: &ImportStats) {
        self.stats.add(stats::BATCHES_IMPORTED, result.batches_processed as u64);
        self.stats.add(stats::QUOTES_IMPORTED, result.quotes.imported as u64);
        self.stats.add(stats::OHLCV_IMPORTED, result.ohlcv.imported as u64);
        self.stats.add(stats::NEWS_IMPORTED, result.news.imported as u64);
        for entity in [&result.quotes, &result.ohlcv, &result.news] {
            self.stats.add(stats::IMPORT_DUPLICATES, entity.skipped_duplicate as u64);
            self.stats.add(stats::IMPORT_VALIDATION_FAILURES, entity.validation_failed as u64);
            self.stats.add(stats::IMPORT_PERSIST_FAILURES, entity.persist_failed as u64);
        }
    }
}

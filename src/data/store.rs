use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

use super::types::{
    normalize_ticker, Bar, BarInterval, BarKey, NewsArticle, NewsKey, Quote, QuoteKey,
    SourceHealthRecord,
};

/// Durable storage consumed by the curator.
///
/// Every insert is idempotent on the record's natural key: a conflicting
/// insert is a no-op, not an error. Batch inserts return how many rows were
/// newly written.
#[async_trait]
pub trait DataStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn insert_quote(&self, quote: &Quote) -> StoreResult<bool>;

    async fn insert_quotes(&self, quotes: &[Quote]) -> StoreResult<usize> {
        let mut inserted = 0;
        for q in quotes {
            if self.insert_quote(q).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn insert_bar(&self, bar: &Bar) -> StoreResult<bool>;

    async fn insert_bars(&self, bars: &[Bar]) -> StoreResult<usize> {
        let mut inserted = 0;
        for b in bars {
            if self.insert_bar(b).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn insert_news(&self, article: &NewsArticle) -> StoreResult<bool>;

    async fn insert_news_batch(&self, articles: &[NewsArticle]) -> StoreResult<usize> {
        let mut inserted = 0;
        for a in articles {
            if self.insert_news(a).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Subset of `keys` already present in the store.
    async fn existing_quote_keys(&self, keys: &[QuoteKey]) -> StoreResult<HashSet<QuoteKey>>;
    async fn existing_bar_keys(&self, keys: &[BarKey]) -> StoreResult<HashSet<BarKey>>;
    async fn existing_news_keys(&self, keys: &[NewsKey]) -> StoreResult<HashSet<NewsKey>>;

    async fn latest_quote(&self, ticker: &str) -> StoreResult<Option<Quote>>;

    /// Newest first.
    async fn query_bars(
        &self,
        ticker: &str,
        interval: BarInterval,
        limit: usize,
    ) -> StoreResult<Vec<Bar>>;

    /// Newest first, optionally restricted to articles mentioning `ticker`.
    async fn recent_news(&self, ticker: Option<&str>, limit: usize)
        -> StoreResult<Vec<NewsArticle>>;

    async fn record_source_health(&self, _record: &SourceHealthRecord) -> StoreResult<()> {
        Ok(())
    }

    /// Liveness probe.
    async fn health_check(&self) -> bool;
}

/// In-process store backed by ordered maps. Used by tests and as the
/// default backend of the binary.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    /// ticker -> (timestamp, source) -> quote
    quotes: Arc<Mutex<HashMap<String, BTreeMap<(DateTime<Utc>, String), Quote>>>>,
    bars: Arc<Mutex<BTreeMap<BarKey, Bar>>>,
    news: Arc<Mutex<NewsTable>>,
    source_health: Arc<Mutex<HashMap<String, SourceHealthRecord>>>,
    healthy: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct NewsTable {
    keys: HashSet<NewsKey>,
    rows: Vec<NewsArticle>,
}

impl NewsTable {
    fn insert(&mut self, article: &NewsArticle) -> bool {
        if !self.keys.insert(article.key()) {
            return false;
        }
        self.rows.push(article.clone());
        true
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            quotes: Arc::new(Mutex::new(HashMap::new())),
            bars: Arc::new(Mutex::new(BTreeMap::new())),
            news: Arc::new(Mutex::new(NewsTable::default())),
            source_health: Arc::new(Mutex::new(HashMap::new())),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates an outage: while unhealthy every call fails with `Unavailable`.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store marked unhealthy".to_string()))
        }
    }

    fn insert_quote_locked(
        map: &mut HashMap<String, BTreeMap<(DateTime<Utc>, String), Quote>>,
        quote: &Quote,
    ) -> bool {
        let series = map.entry(quote.ticker.clone()).or_default();
        let key = (quote.timestamp, quote.source.clone());
        if series.contains_key(&key) {
            return false;
        }
        series.insert(key, quote.clone());
        true
    }

    pub fn quote_count(&self) -> usize {
        let map = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        map.values().map(|s| s.len()).sum()
    }

    pub fn quote_history(&self, ticker: &str) -> Vec<Quote> {
        let map = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&normalize_ticker(ticker))
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bar_count(&self) -> usize {
        self.bars.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn news_count(&self) -> usize {
        self.news.lock().unwrap_or_else(|e| e.into_inner()).rows.len()
    }

    pub fn stored_source_health(&self, source: &str) -> Option<SourceHealthRecord> {
        let map = self.source_health.lock().unwrap_or_else(|e| e.into_inner());
        map.get(source).cloned()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert_quote(&self, quote: &Quote) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut map = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Self::insert_quote_locked(&mut map, quote))
    }

    async fn insert_quotes(&self, quotes: &[Quote]) -> StoreResult<usize> {
        self.ensure_available()?;
        let mut map = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        let inserted = quotes
            .iter()
            .filter(|q| Self::insert_quote_locked(&mut map, q))
            .count();
        debug!("[STORE] inserted {}/{} quotes", inserted, quotes.len());
        Ok(inserted)
    }

    async fn insert_bar(&self, bar: &Bar) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        let key = bar.key();
        if bars.contains_key(&key) {
            return Ok(false);
        }
        bars.insert(key, bar.clone());
        Ok(true)
    }

    async fn insert_bars(&self, bars: &[Bar]) -> StoreResult<usize> {
        self.ensure_available()?;
        let mut table = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        let mut inserted = 0;
        for bar in bars {
            let key = bar.key();
            if !table.contains_key(&key) {
                table.insert(key, bar.clone());
                inserted += 1;
            }
        }
        debug!("[STORE] inserted {}/{} bars", inserted, bars.len());
        Ok(inserted)
    }

    async fn insert_news(&self, article: &NewsArticle) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut news = self.news.lock().unwrap_or_else(|e| e.into_inner());
        Ok(news.insert(article))
    }

    async fn insert_news_batch(&self, articles: &[NewsArticle]) -> StoreResult<usize> {
        self.ensure_available()?;
        let mut news = self.news.lock().unwrap_or_else(|e| e.into_inner());
        Ok(articles.iter().filter(|a| news.insert(a)).count())
    }

    async fn existing_quote_keys(&self, keys: &[QuoteKey]) -> StoreResult<HashSet<QuoteKey>> {
        self.ensure_available()?;
        let map = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys
            .iter()
            .filter(|k| {
                map.get(&k.ticker)
                    .map(|s| s.contains_key(&(k.timestamp, k.source.clone())))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn existing_bar_keys(&self, keys: &[BarKey]) -> StoreResult<HashSet<BarKey>> {
        self.ensure_available()?;
        let bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys.iter().filter(|k| bars.contains_key(k)).cloned().collect())
    }

    async fn existing_news_keys(&self, keys: &[NewsKey]) -> StoreResult<HashSet<NewsKey>> {
        self.ensure_available()?;
        let news = self.news.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys.iter().filter(|k| news.keys.contains(k)).cloned().collect())
    }

    async fn latest_quote(&self, ticker: &str) -> StoreResult<Option<Quote>> {
        self.ensure_available()?;
        let map = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map
            .get(&normalize_ticker(ticker))
            .and_then(|s| s.values().next_back())
            .cloned())
    }

    async fn query_bars(
        &self,
        ticker: &str,
        interval: BarInterval,
        limit: usize,
    ) -> StoreResult<Vec<Bar>> {
        self.ensure_available()?;
        let ticker = normalize_ticker(ticker);
        let bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<Bar> = bars
            .values()
            .filter(|b| b.ticker == ticker && b.interval == interval)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.bucket.cmp(&a.bucket));
        out.truncate(limit);
        Ok(out)
    }

    async fn recent_news(
        &self,
        ticker: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<NewsArticle>> {
        self.ensure_available()?;
        let news = self.news.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<NewsArticle> = news
            .rows
            .iter()
            .filter(|a| ticker.map(|t| a.mentions(t)).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn record_source_health(&self, record: &SourceHealthRecord) -> StoreResult<()> {
        self.ensure_available()?;
        let mut map = self.source_health.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(record.source.clone(), record.clone());
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

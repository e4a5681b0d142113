//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::bus::EventBus;
use crate::data::cache::QuoteCache;
use crate::data::store::{DataStore, MemoryStore};
use crate::data::types::{
    Bar, BarInterval, BarKey, HistoryPeriod, NewsArticle, NewsKey, Quote, QuoteKey,
    SourceHealthRecord,
};
use crate::error::{SourceError, SourceResult, StoreError, StoreResult};
use crate::services::ingestion::IngestionEngine;
use crate::services::stats::{HealthThresholds, StatsTracker};
use crate::sources::traits::{SourceAdapter, SourceCapabilities};

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_735_689_600 + secs, 0).single().unwrap()
}

/// Source whose answers are set per ticker. Unknown tickers fail.
pub struct ScriptedSource {
    name: String,
    capabilities: SourceCapabilities,
    prices: Mutex<HashMap<String, f64>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    news: Mutex<Option<Vec<NewsArticle>>>,
    bars: Mutex<Option<Vec<Bar>>>,
}

impl ScriptedSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capabilities: SourceCapabilities {
                quotes: true,
                news: false,
                historical: false,
            },
            prices: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            delay: Mutex::new(None),
            news: Mutex::new(None),
            bars: Mutex::new(None),
        }
    }

    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_price(self, ticker: &str, price: f64) -> Self {
        self.set_price(ticker, price);
        self
    }

    pub fn with_news(self, articles: Vec<NewsArticle>) -> Self {
        *self.news.lock().unwrap() = Some(articles);
        self
    }

    pub fn with_bars(self, bars: Vec<Bar>) -> Self {
        *self.bars.lock().unwrap() = Some(bars);
        self
    }

    pub fn set_price(&self, ticker: &str, price: f64) {
        self.prices.lock().unwrap().insert(ticker.to_string(), price);
    }

    pub fn set_failing(&self, ticker: &str) {
        self.prices.lock().unwrap().remove(ticker);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    async fn fetch_quote(&self, ticker: &str) -> SourceResult<Quote> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as i64;
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let price = self.prices.lock().unwrap().get(ticker).copied();
        match price {
            Some(p) => Ok(Quote::new(ticker, ts(n), p, 100, &self.name)),
            None => Err(SourceError::Other(format!("connection reset fetching {}", ticker))),
        }
    }

    async fn fetch_news(&self, _ticker: Option<&str>, limit: usize) -> SourceResult<Vec<NewsArticle>> {
        match self.news.lock().unwrap().clone() {
            Some(mut articles) => {
                articles.truncate(limit);
                Ok(articles)
            }
            None => Err(SourceError::Other("news feed down".to_string())),
        }
    }

    async fn fetch_historical(
        &self,
        _ticker: &str,
        _period: HistoryPeriod,
        _interval: BarInterval,
    ) -> SourceResult<Vec<Bar>> {
        self.bars
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SourceError::Other("history unavailable".to_string()))
    }
}

/// MemoryStore wrapper whose writes can be made to fail, per call or all at once.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_writes: AtomicBool,
    write_calls: AtomicUsize,
    failing_calls: Mutex<HashSet<usize>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes the n-th write call (0-based) fail.
    pub fn fail_write_call(&self, n: usize) {
        self.failing_calls.lock().unwrap().insert(n);
    }

    fn check_write(&self) -> StoreResult<()> {
        let n = self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) || self.failing_calls.lock().unwrap().contains(&n) {
            return Err(StoreError::Write(format!("write {} refused", n)));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn insert_quote(&self, quote: &Quote) -> StoreResult<bool> {
        self.check_write()?;
        self.inner.insert_quote(quote).await
    }

    async fn insert_quotes(&self, quotes: &[Quote]) -> StoreResult<usize> {
        self.check_write()?;
        self.inner.insert_quotes(quotes).await
    }

    async fn insert_bar(&self, bar: &Bar) -> StoreResult<bool> {
        self.check_write()?;
        self.inner.insert_bar(bar).await
    }

    async fn insert_bars(&self, bars: &[Bar]) -> StoreResult<usize> {
        self.check_write()?;
        self.inner.insert_bars(bars).await
    }

    async fn insert_news(&self, article: &NewsArticle) -> StoreResult<bool> {
        self.check_write()?;
        self.inner.insert_news(article).await
    }

    async fn insert_news_batch(&self, articles: &[NewsArticle]) -> StoreResult<usize> {
        self.check_write()?;
        self.inner.insert_news_batch(articles).await
    }

    async fn existing_quote_keys(&self, keys: &[QuoteKey]) -> StoreResult<HashSet<QuoteKey>> {
        self.inner.existing_quote_keys(keys).await
    }

    async fn existing_bar_keys(&self, keys: &[BarKey]) -> StoreResult<HashSet<BarKey>> {
        self.inner.existing_bar_keys(keys).await
    }

    async fn existing_news_keys(&self, keys: &[NewsKey]) -> StoreResult<HashSet<NewsKey>> {
        self.inner.existing_news_keys(keys).await
    }

    async fn latest_quote(&self, ticker: &str) -> StoreResult<Option<Quote>> {
        self.inner.latest_quote(ticker).await
    }

    async fn query_bars(&self, ticker: &str, interval: BarInterval, limit: usize) -> StoreResult<Vec<Bar>> {
        self.inner.query_bars(ticker, interval, limit).await
    }

    async fn recent_news(&self, ticker: Option<&str>, limit: usize) -> StoreResult<Vec<NewsArticle>> {
        self.inner.recent_news(ticker, limit).await
    }

    async fn record_source_health(&self, record: &SourceHealthRecord) -> StoreResult<()> {
        self.inner.record_source_health(record).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}

pub struct EngineFixture {
    pub engine: Arc<IngestionEngine>,
    pub stats: Arc<StatsTracker>,
    pub bus: EventBus,
}

pub fn engine_with(
    sources: Vec<Arc<dyn SourceAdapter>>,
    store: Arc<dyn DataStore>,
    ttl: Duration,
) -> EngineFixture {
    let stats = Arc::new(StatsTracker::new(HealthThresholds::default()));
    let bus = EventBus::new(256);
    let engine = Arc::new(IngestionEngine::new(
        sources,
        QuoteCache::new(ttl),
        store,
        stats.clone(),
        bus.clone(),
    ));
    EngineFixture { engine, stats, bus }
}

pub fn article(headline: &str, source: &str, published_secs: i64, tickers: &[&str]) -> NewsArticle {
    NewsArticle {
        headline: headline.to_string(),
        content: None,
        summary: None,
        url: None,
        source: source.to_string(),
        published_at: ts(published_secs),
        received_at: Utc::now(),
        tickers: tickers.iter().map(|t| t.to_string()).collect(),
        sentiment_score: None,
        sentiment_label: None,
        embedding: None,
        metadata: serde_json::Value::Null,
    }
}

pub fn bar(ticker: &str, day: i64, low: f64, high: f64, source: &str) -> Bar {
    Bar {
        ticker: ticker.to_string(),
        bucket: ts(day * 86_400),
        interval: BarInterval::Day1,
        open: low,
        high,
        low,
        close: high,
        volume: 1_000,
        adj_close: None,
        source: source.to_string(),
    }
}

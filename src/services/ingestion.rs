use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::constants::stats;
use crate::data::cache::QuoteCache;
use crate::data::store::DataStore;
use crate::data::types::{day_bucket, normalize_ticker, Bar, BarInterval, HistoryPeriod, NewsArticle, Quote};
use crate::error::{CuratorError, CuratorResult, SourceError, SourceFailure};
use crate::events::CuratorEvent;
use crate::sources::traits::SourceAdapter;

use super::stats::StatsTracker;

/// Fetch -> validate -> cache -> persist for one ticker, across sources in
/// priority order. Shared by the background worker and on-demand callers.
pub struct IngestionEngine {
    sources: Vec<Arc<dyn SourceAdapter>>,
    cache: QuoteCache,
    store: Arc<dyn DataStore>,
    stats: Arc<StatsTracker>,
    bus: EventBus,
}

impl IngestionEngine {
    /// `sources` must already be in priority order.
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        cache: QuoteCache,
        store: Arc<dyn DataStore>,
        stats: Arc<StatsTracker>,
        bus: EventBus,
    ) -> Self {
        for source in &sources {
            stats.register_source(source.name());
        }
        Self {
            sources,
            cache,
            store,
            stats,
            bus,
        }
    }

    pub fn sources(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.sources
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn has_news_source(&self) -> bool {
        self.sources.iter().any(|s| s.capabilities().news)
    }

    /// Always goes to the sources, never the cache. First success wins.
    pub async fn fetch_quote(&self, ticker: &str) -> CuratorResult<Quote> {
        let ticker = normalize_ticker(ticker);
        if ticker.is_empty() {
            return Err(CuratorError::Validation("empty ticker".to_string()));
        }

        let mut failures = Vec::new();
        for source in self.sources.iter().filter(|s| s.capabilities().quotes) {
            let result = source
                .fetch_quote(&ticker)
                .await
                .and_then(|q| validate_quote(&ticker, q));

            match result {
                Ok(quote) => {
                    self.record_success(source.name()).await;
                    self.stats.increment(stats::QUOTES_FETCHED);
                    debug!("[SOURCE] {} {} @ {} ({})", source.name(), ticker, quote.price, quote.timestamp);
                    return Ok(quote);
                }
                Err(e) => {
                    debug!("[SOURCE] {} failed for {}: {}", source.name(), ticker, e);
                    self.record_failure(source.name(), &e).await;
                    failures.push(SourceFailure {
                        source: source.name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.stats.increment(stats::FETCH_FAILURES);
        Err(CuratorError::SourceUnavailable { ticker, failures })
    }

    /// Fetch, then write through to the cache and the store. A store failure
    /// is logged and counted; the fetched quote is still returned.
    pub async fn refresh_and_persist(&self, ticker: &str) -> CuratorResult<Quote> {
        let quote = self.fetch_quote(ticker).await?;
        self.write_through(&quote).await;
        Ok(quote)
    }

    async fn write_through(&self, quote: &Quote) {
        self.cache.put(&quote.ticker, quote.clone());

        let persisted = match self.store.insert_quote(quote).await {
            Ok(true) => {
                self.stats.increment(stats::QUOTES_PERSISTED);
                true
            }
            Ok(false) => {
                self.stats.increment(stats::QUOTES_DUPLICATE);
                false
            }
            Err(e) => {
                self.stats.increment(stats::PERSIST_FAILURES);
                warn!("⚠️ [STORE] Failed to persist quote for {}: {}", quote.ticker, e);
                false
            }
        };

        self.bus.emit(CuratorEvent::QuoteIngested {
            ticker: quote.ticker.clone(),
            price: quote.price,
            source: quote.source.clone(),
            persisted,
        });
    }

    /// Cache-first read; a miss (absent or stale) refreshes from the sources.
    pub async fn get_quote(&self, ticker: &str) -> CuratorResult<Quote> {
        let (cached, hit) = self.cache.get(ticker);
        if hit {
            if let Some(quote) = cached {
                self.stats.increment(stats::CACHE_HITS);
                return Ok(quote);
            }
        }
        self.stats.increment(stats::CACHE_MISSES);
        self.refresh_and_persist(ticker).await
    }

    /// Cache-first for every ticker. Misses go to each quote source as one
    /// batch, in priority order, until all are answered or the sources run
    /// out. Failed tickers are left out.
    pub async fn get_quotes(&self, tickers: &[String]) -> HashMap<String, Quote> {
        let mut out = HashMap::with_capacity(tickers.len());
        let mut pending: Vec<String> = Vec::new();
        for ticker in tickers.iter().map(|t| normalize_ticker(t)) {
            if ticker.is_empty() || out.contains_key(&ticker) || pending.contains(&ticker) {
                continue;
            }
            match self.cache.get(&ticker) {
                (Some(quote), true) => {
                    self.stats.increment(stats::CACHE_HITS);
                    out.insert(ticker, quote);
                }
                _ => {
                    self.stats.increment(stats::CACHE_MISSES);
                    pending.push(ticker);
                }
            }
        }

        for source in self.sources.iter().filter(|s| s.capabilities().quotes) {
            if pending.is_empty() {
                break;
            }
            let mut fetched = match source.fetch_quotes_batch(&pending).await {
                Ok(fetched) => {
                    self.record_success(source.name()).await;
                    fetched
                }
                Err(e) => {
                    debug!("[SOURCE] {} batch of {} failed: {}", source.name(), pending.len(), e);
                    self.record_failure(source.name(), &e).await;
                    continue;
                }
            };

            let mut still_pending = Vec::with_capacity(pending.len());
            for ticker in pending {
                match fetched.remove(&ticker).map(|q| validate_quote(&ticker, q)) {
                    Some(Ok(quote)) => {
                        self.stats.increment(stats::QUOTES_FETCHED);
                        self.write_through(&quote).await;
                        out.insert(ticker, quote);
                    }
                    Some(Err(e)) => {
                        debug!("[SOURCE] {} rejected for {}: {}", source.name(), ticker, e);
                        still_pending.push(ticker);
                    }
                    None => still_pending.push(ticker),
                }
            }
            pending = still_pending;
        }

        for ticker in &pending {
            self.stats.increment(stats::FETCH_FAILURES);
            debug!("[CURATOR] {} skipped: no source answered", ticker);
        }
        out
    }

    /// Fetches news from the first news source that answers and persists it.
    pub async fn fetch_news(&self, ticker: Option<&str>, limit: usize) -> CuratorResult<Vec<NewsArticle>> {
        let ticker = ticker.map(normalize_ticker).filter(|t| !t.is_empty());
        let label = ticker.clone().unwrap_or_else(|| "news".to_string());

        let mut failures = Vec::new();
        for source in self.sources.iter().filter(|s| s.capabilities().news) {
            match source.fetch_news(ticker.as_deref(), limit).await {
                Ok(articles) => {
                    self.record_success(source.name()).await;
                    let articles: Vec<NewsArticle> = articles
                        .into_iter()
                        .filter(|a| !a.headline.trim().is_empty())
                        .map(clamp_sentiment)
                        .collect();
                    self.stats.add(stats::NEWS_FETCHED, articles.len() as u64);

                    let persisted = match self.store.insert_news_batch(&articles).await {
                        Ok(n) => {
                            self.stats.add(stats::NEWS_PERSISTED, n as u64);
                            n
                        }
                        Err(e) => {
                            self.stats.increment(stats::PERSIST_FAILURES);
                            warn!("⚠️ [STORE] Failed to persist {} articles: {}", articles.len(), e);
                            0
                        }
                    };
                    info!(
                        "📰 [CURATOR] {} articles from {} for {} ({} new)",
                        articles.len(),
                        source.name(),
                        label,
                        persisted
                    );
                    self.bus.emit(CuratorEvent::NewsIngested {
                        source: source.name().to_string(),
                        fetched: articles.len(),
                        persisted,
                    });
                    return Ok(articles);
                }
                Err(e) => {
                    self.record_failure(source.name(), &e).await;
                    failures.push(SourceFailure {
                        source: source.name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.stats.increment(stats::FETCH_FAILURES);
        Err(CuratorError::SourceUnavailable { ticker: label, failures })
    }

    /// Fetches historical bars from the first source that answers and persists them.
    pub async fn fetch_historical(
        &self,
        ticker: &str,
        period: HistoryPeriod,
        interval: BarInterval,
    ) -> CuratorResult<Vec<Bar>> {
        let ticker = normalize_ticker(ticker);
        if ticker.is_empty() {
            return Err(CuratorError::Validation("empty ticker".to_string()));
        }

        let mut failures = Vec::new();
        for source in self.sources.iter().filter(|s| s.capabilities().historical) {
            match source.fetch_historical(&ticker, period, interval).await {
                Ok(bars) => {
                    self.record_success(source.name()).await;
                    let fetched = bars.len();
                    let bars: Vec<Bar> = bars
                        .into_iter()
                        .filter_map(|b| normalize_bar(&ticker, interval, b))
                        .collect();
                    if bars.len() < fetched {
                        debug!("[SOURCE] {} dropped {} invalid bars for {}", source.name(), fetched - bars.len(), ticker);
                    }
                    self.stats.add(stats::BARS_FETCHED, bars.len() as u64);

                    let persisted = match self.store.insert_bars(&bars).await {
                        Ok(n) => {
                            self.stats.add(stats::BARS_PERSISTED, n as u64);
                            n
                        }
                        Err(e) => {
                            self.stats.increment(stats::PERSIST_FAILURES);
                            warn!("⚠️ [STORE] Failed to persist {} bars for {}: {}", bars.len(), ticker, e);
                            0
                        }
                    };
                    info!(
                        "📈 [CURATOR] {} {} bars for {} over {} from {} ({} new)",
                        bars.len(),
                        interval,
                        ticker,
                        period,
                        source.name(),
                        persisted
                    );
                    self.bus.emit(CuratorEvent::BarsIngested {
                        ticker: ticker.clone(),
                        source: source.name().to_string(),
                        fetched: bars.len(),
                        persisted,
                    });
                    return Ok(bars);
                }
                Err(e) => {
                    self.record_failure(source.name(), &e).await;
                    failures.push(SourceFailure {
                        source: source.name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.stats.increment(stats::FETCH_FAILURES);
        Err(CuratorError::SourceUnavailable { ticker, failures })
    }

    async fn record_success(&self, source: &str) {
        let change = self.stats.record_success(source);
        self.after_health_update(source, change).await;
    }

    async fn record_failure(&self, source: &str, error: &SourceError) {
        // A capability the source never had says nothing about its health
        if matches!(error, SourceError::Unsupported { .. }) {
            return;
        }
        let change = self.stats.record_failure(source, &error.to_string());
        self.after_health_update(source, change).await;
    }

    async fn after_health_update(&self, source: &str, change: super::stats::StatusChange) {
        if change.changed() {
            self.bus.emit(CuratorEvent::SourceStatusChanged {
                source: source.to_string(),
                from: change.from,
                to: change.to,
            });
        }
        if let Some(record) = self.stats.source_health(source) {
            if let Err(e) = self.store.record_source_health(&record).await {
                debug!("[STORE] source health for {} not recorded: {}", source, e);
            }
        }
    }
}

fn validate_quote(ticker: &str, mut quote: Quote) -> Result<Quote, SourceError> {
    if !quote.price.is_finite() || quote.price < 0.0 {
        return Err(SourceError::Other(format!(
            "invalid price {} for {}",
            quote.price, ticker
        )));
    }
    // The requested ticker is the cache and store key, whatever the source echoes back
    if normalize_ticker(&quote.ticker) != ticker {
        debug!("[SOURCE] {} answered as {:?}", ticker, quote.ticker);
    }
    quote.ticker = ticker.to_string();
    Ok(quote)
}

fn clamp_sentiment(mut article: NewsArticle) -> NewsArticle {
    if let Some(score) = article.sentiment_score {
        if !(-1.0..=1.0).contains(&score) {
            article.sentiment_score = None;
        }
    }
    article.tickers = article
        .tickers
        .iter()
        .map(|t| normalize_ticker(t))
        .filter(|t| !t.is_empty())
        .collect();
    article
}

fn normalize_bar(ticker: &str, interval: BarInterval, mut bar: Bar) -> Option<Bar> {
    let prices = [bar.open, bar.high, bar.low, bar.close];
    if prices.iter().any(|p| !p.is_finite() || *p < 0.0) || bar.high < bar.low {
        return None;
    }
    bar.ticker = ticker.to_string();
    bar.interval = interval;
    if interval.is_daily() {
        bar.bucket = day_bucket(bar.bucket);
    }
    Some(bar)
}

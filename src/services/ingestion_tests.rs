//! Unit tests for IngestionEngine: fallback order, cache-first reads,
//! write-through persistence and health bookkeeping.

#[cfg(test)]
mod ingestion_tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::constants::stats;
    use crate::data::store::{DataStore, MemoryStore};
    use crate::data::types::{BarInterval, HistoryPeriod, Quote, SourceStatus};
    use crate::error::{CuratorError, SourceError, SourceResult};
    use crate::events::CuratorEvent;
    use crate::sources::traits::{SourceAdapter, SourceCapabilities};
    use crate::testing::{article, bar, engine_with, ts, FlakyStore, ScriptedSource};

    const TTL: Duration = Duration::from_secs(60);

    /// Answers only in bulk, and labels every quote with `echo` as its ticker.
    struct BulkSource {
        echo: &'static str,
        single_calls: AtomicUsize,
        batch_calls: AtomicUsize,
        batch_sizes: std::sync::Mutex<Vec<usize>>,
    }

    impl BulkSource {
        fn new(echo: &'static str) -> Self {
            Self {
                echo,
                single_calls: AtomicUsize::new(0),
                batch_calls: AtomicUsize::new(0),
                batch_sizes: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for BulkSource {
        fn name(&self) -> &str {
            "bulk"
        }

        fn capabilities(&self) -> SourceCapabilities {
            SourceCapabilities {
                quotes: true,
                news: false,
                historical: false,
            }
        }

        async fn fetch_quote(&self, ticker: &str) -> SourceResult<Quote> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            let label = if self.echo.is_empty() { ticker } else { self.echo };
            Ok(Quote::new(label, ts(0), 10.0, 1, "bulk"))
        }

        async fn fetch_quotes_batch(&self, tickers: &[String]) -> SourceResult<HashMap<String, Quote>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(tickers.len());
            if tickers.is_empty() {
                return Err(SourceError::Other("empty batch".to_string()));
            }
            Ok(tickers
                .iter()
                .filter(|t| t.as_str() != "GOOGL")
                .map(|t| (t.clone(), Quote::new(t, ts(0), 20.0, 1, "bulk")))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_first_successful_source_wins() {
        let primary = Arc::new(ScriptedSource::new("primary"));
        let backup = Arc::new(ScriptedSource::new("backup").with_price("AAPL", 187.5));
        let store = Arc::new(MemoryStore::new());
        let fx = engine_with(vec![primary.clone(), backup.clone()], store, TTL);

        let quote = fx.engine.fetch_quote("aapl").await.unwrap();
        assert_eq!(quote.source, "backup");
        assert_eq!(quote.ticker, "AAPL");
        assert_eq!(primary.calls(), 1);
        assert_eq!(backup.calls(), 1);

        assert_eq!(fx.stats.source_health("primary").unwrap().consecutive_errors, 1);
        assert_eq!(fx.stats.source_health("backup").unwrap().total_successes, 1);
        assert_eq!(fx.stats.get(stats::FETCH_FAILURES), 0);
    }

    #[tokio::test]
    async fn test_all_sources_failing_reports_every_attempt() {
        let a = Arc::new(ScriptedSource::new("a"));
        let b = Arc::new(ScriptedSource::new("b"));
        let fx = engine_with(vec![a, b], Arc::new(MemoryStore::new()), TTL);

        let err = fx.engine.fetch_quote("GOOGL").await.unwrap_err();
        match err {
            CuratorError::SourceUnavailable { ticker, failures } => {
                assert_eq!(ticker, "GOOGL");
                let names: Vec<&str> = failures.iter().map(|f| f.source.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("expected SourceUnavailable, got {:?}", other),
        }
        assert_eq!(fx.stats.get(stats::FETCH_FAILURES), 1);
    }

    #[tokio::test]
    async fn test_sources_without_quote_capability_skipped() {
        let news_only = Arc::new(ScriptedSource::new("news").with_capabilities(SourceCapabilities {
            quotes: false,
            news: true,
            historical: false,
        }));
        let fx = engine_with(vec![news_only.clone()], Arc::new(MemoryStore::new()), TTL);

        assert!(fx.engine.fetch_quote("AAPL").await.is_err());
        assert_eq!(news_only.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_ticker_is_validation_error() {
        let fx = engine_with(vec![], Arc::new(MemoryStore::new()), TTL);
        assert!(matches!(
            fx.engine.fetch_quote("  ").await,
            Err(CuratorError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_writes_through_cache_and_store() {
        let source = Arc::new(ScriptedSource::new("primary").with_price("AAPL", 187.5));
        let store = Arc::new(MemoryStore::new());
        let fx = engine_with(vec![source], store.clone(), TTL);
        let mut rx = fx.bus.subscribe();

        let quote = fx.engine.refresh_and_persist("AAPL").await.unwrap();

        let (cached, hit) = fx.engine.cache().get("AAPL");
        assert!(hit);
        assert_eq!(cached.unwrap(), quote);

        let stored = store.latest_quote("AAPL").await.unwrap().unwrap();
        assert_eq!(stored.ticker, quote.ticker);
        assert_eq!(stored.timestamp, quote.timestamp);
        assert_eq!(stored.price, quote.price);
        assert_eq!(stored.volume, quote.volume);
        assert_eq!(stored.source, quote.source);
        assert_eq!(fx.stats.get(stats::QUOTES_PERSISTED), 1);

        loop {
            match rx.recv().await.unwrap() {
                CuratorEvent::QuoteIngested { ticker, persisted, .. } => {
                    assert_eq!(ticker, "AAPL");
                    assert!(persisted);
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_persist_failure_still_returns_quote() {
        let source = Arc::new(ScriptedSource::new("primary").with_price("AAPL", 187.5));
        let store = Arc::new(FlakyStore::new());
        store.fail_writes(true);
        let fx = engine_with(vec![source], store.clone(), TTL);

        let quote = fx.engine.refresh_and_persist("AAPL").await.unwrap();
        assert_eq!(quote.price, 187.5);
        assert!(fx.engine.cache().is_fresh("AAPL"));
        assert_eq!(fx.stats.get(stats::PERSIST_FAILURES), 1);
        assert_eq!(store.inner.quote_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_quote_is_cache_first_until_ttl() {
        let source = Arc::new(ScriptedSource::new("primary").with_price("AAPL", 187.5));
        let fx = engine_with(vec![source.clone()], Arc::new(MemoryStore::new()), TTL);

        fx.engine.get_quote("AAPL").await.unwrap();
        assert_eq!(fx.stats.get(stats::CACHE_MISSES), 1);
        assert_eq!(source.calls(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        fx.engine.get_quote("AAPL").await.unwrap();
        assert_eq!(fx.stats.get(stats::CACHE_HITS), 1);
        assert_eq!(source.calls(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        fx.engine.get_quote("AAPL").await.unwrap();
        assert_eq!(fx.stats.get(stats::CACHE_MISSES), 2);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_get_quotes_skips_failures() {
        let source = Arc::new(ScriptedSource::new("primary").with_price("AAPL", 1.0));
        let fx = engine_with(vec![source], Arc::new(MemoryStore::new()), TTL);

        let quotes = fx
            .engine
            .get_quotes(&["AAPL".to_string(), "GOOGL".to_string()])
            .await;
        assert_eq!(quotes.len(), 1);
        assert!(quotes.contains_key("AAPL"));
    }

    #[tokio::test]
    async fn test_get_quotes_batches_cache_misses() {
        let source = Arc::new(BulkSource::new(""));
        let store = Arc::new(MemoryStore::new());
        let fx = engine_with(vec![source.clone()], store.clone(), TTL);

        let first = fx.engine.get_quote("MSFT").await.unwrap();
        assert_eq!(source.single_calls.load(Ordering::SeqCst), 1);

        let tickers: Vec<String> = ["msft", "AAPL", "TSLA", "aapl", "GOOGL"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        let quotes = fx.engine.get_quotes(&tickers).await;

        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes["MSFT"].price, first.price);
        assert_eq!(quotes["TSLA"].price, 20.0);
        assert_eq!(source.single_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*source.batch_sizes.lock().unwrap(), vec![3]);

        assert_eq!(fx.stats.get(stats::CACHE_HITS), 1);
        assert_eq!(fx.stats.get(stats::FETCH_FAILURES), 1);
        assert!(store.latest_quote("TSLA").await.unwrap().is_some());
        assert!(fx.engine.cache().is_fresh("AAPL"));
    }

    #[tokio::test]
    async fn test_get_quotes_falls_back_per_ticker() {
        let primary = Arc::new(BulkSource::new(""));
        let backup = Arc::new(ScriptedSource::new("backup").with_price("GOOGL", 170.0));
        let fx = engine_with(vec![primary.clone(), backup.clone()], Arc::new(MemoryStore::new()), TTL);

        let quotes = fx
            .engine
            .get_quotes(&["AAPL".to_string(), "GOOGL".to_string()])
            .await;

        assert_eq!(quotes["AAPL"].source, "bulk");
        assert_eq!(quotes["GOOGL"].source, "backup");
        // Only the ticker the primary could not answer reaches the backup
        assert_eq!(backup.calls(), 1);
        assert_eq!(fx.stats.get(stats::FETCH_FAILURES), 0);
    }

    #[tokio::test]
    async fn test_quote_keyed_by_requested_ticker() {
        let source = Arc::new(BulkSource::new("BRK.B"));
        let store = Arc::new(MemoryStore::new());
        let fx = engine_with(vec![source.clone()], store.clone(), TTL);

        let quote = fx.engine.get_quote("brk-b").await.unwrap();
        assert_eq!(quote.ticker, "BRK-B");

        fx.engine.get_quote("BRK-B").await.unwrap();
        assert_eq!(source.single_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.stats.get(stats::CACHE_HITS), 1);
        assert!(store.latest_quote("BRK-B").await.unwrap().is_some());
        assert!(store.latest_quote("BRK.B").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_degraded_after_three_failures_and_event() {
        let source = Arc::new(ScriptedSource::new("primary"));
        let store = Arc::new(MemoryStore::new());
        let fx = engine_with(vec![source.clone()], store.clone(), TTL);
        let mut rx = fx.bus.subscribe();

        for _ in 0..3 {
            let _ = fx.engine.fetch_quote("GOOGL").await;
        }
        assert_eq!(fx.stats.source_health("primary").unwrap().status, SourceStatus::Degraded);
        assert_eq!(store.stored_source_health("primary").unwrap().consecutive_errors, 3);

        let mut saw_change = false;
        while let Ok(event) = rx.try_recv() {
            if let CuratorEvent::SourceStatusChanged { to, .. } = event {
                assert_eq!(to, SourceStatus::Degraded);
                saw_change = true;
            }
        }
        assert!(saw_change);

        source.set_price("GOOGL", 140.0);
        fx.engine.fetch_quote("GOOGL").await.unwrap();
        let record = fx.stats.source_health("primary").unwrap();
        assert_eq!(record.status, SourceStatus::Active);
        assert_eq!(record.consecutive_errors, 0);
    }

    #[tokio::test]
    async fn test_fetch_news_persists_articles() {
        let feed = Arc::new(
            ScriptedSource::new("wire")
                .with_capabilities(SourceCapabilities::all())
                .with_news(vec![
                    article("Fed holds", "wire", 0, &["spy"]),
                    article("Fed holds", "wire", 0, &["spy"]),
                    article("Chips rally", "wire", 60, &["NVDA"]),
                ]),
        );
        let store = Arc::new(MemoryStore::new());
        let fx = engine_with(vec![feed], store.clone(), TTL);

        let articles = fx.engine.fetch_news(None, 10).await.unwrap();
        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0].tickers, vec!["SPY"]);
        assert_eq!(fx.stats.get(stats::NEWS_FETCHED), 3);
        assert_eq!(fx.stats.get(stats::NEWS_PERSISTED), 2);
        assert_eq!(store.news_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_historical_drops_invalid_bars() {
        let source: Arc<dyn SourceAdapter> = Arc::new(
            ScriptedSource::new("hist")
                .with_capabilities(SourceCapabilities::all())
                .with_bars(vec![
                    bar("SPY", 0, 1.0, 2.0, "hist"),
                    bar("SPY", 1, 3.0, 2.0, "hist"),
                ]),
        );
        let store = Arc::new(MemoryStore::new());
        let fx = engine_with(vec![source], store.clone(), TTL);

        let bars = fx
            .engine
            .fetch_historical("spy", HistoryPeriod::Week1, BarInterval::Day1)
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(fx.stats.get(stats::BARS_PERSISTED), 1);
        assert_eq!(store.query_bars("SPY", BarInterval::Day1, 10).await.unwrap().len(), 1);
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::types::{Bar, BarInterval, HistoryPeriod, NewsArticle, Quote};
use crate::error::{SourceError, SourceResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCapabilities {
    pub quotes: bool,
    pub news: bool,
    pub historical: bool,
}

impl SourceCapabilities {
    pub fn all() -> Self {
        Self {
            quotes: true,
            news: true,
            historical: true,
        }
    }
}

/// One upstream market-data provider. The curator treats every adapter the
/// same way; bounding request latency is the adapter's own job.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> SourceCapabilities;

    async fn fetch_quote(&self, ticker: &str) -> SourceResult<Quote>;

    /// Successful quotes keyed by ticker. Fails only when nothing could be fetched.
    async fn fetch_quotes_batch(&self, tickers: &[String]) -> SourceResult<HashMap<String, Quote>> {
        let mut out = HashMap::with_capacity(tickers.len());
        let mut last_err = None;
        for ticker in tickers {
            match self.fetch_quote(ticker).await {
                Ok(q) => {
                    out.insert(ticker.clone(), q);
                }
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) if out.is_empty() => Err(e),
            _ => Ok(out),
        }
    }

    async fn fetch_news(&self, _ticker: Option<&str>, _limit: usize) -> SourceResult<Vec<NewsArticle>> {
        Err(SourceError::Unsupported {
            source_name: self.name().to_string(),
            operation: "news",
        })
    }

    async fn fetch_historical(
        &self,
        _ticker: &str,
        _period: HistoryPeriod,
        _interval: BarInterval,
    ) -> SourceResult<Vec<Bar>> {
        Err(SourceError::Unsupported {
            source_name: self.name().to_string(),
            operation: "historical",
        })
    }
}

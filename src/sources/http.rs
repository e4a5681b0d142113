use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::data::parse::{json_f64, json_str, json_tickers, json_timestamp, json_u64};
use crate::data::types::{normalize_ticker, Bar, BarInterval, HistoryPeriod, NewsArticle, Quote};
use crate::error::{SourceError, SourceResult};

use super::traits::{SourceAdapter, SourceCapabilities};

/// Generic JSON resource fetcher: `GET {base}/resource/{kind}?...` with an
/// optional bearer token.
#[derive(Clone)]
pub struct HttpSource {
    name: String,
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    capabilities: SourceCapabilities,
}

impl HttpSource {
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        capabilities: SourceCapabilities,
    ) -> SourceResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| SourceError::Other(format!("invalid base_url '{}': {}", base_url, e)))?;
        // Url::join drops the last path segment unless it ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            name: name.to_string(),
            client,
            base_url,
            api_key,
            capabilities,
        })
    }

    fn resource_url(&self, kind: &str) -> SourceResult<Url> {
        self.base_url
            .join(&format!("resource/{}", kind))
            .map_err(|e| SourceError::Other(format!("bad resource url: {}", e)))
    }

    async fn get_resource(&self, kind: &str, params: &[(&str, String)]) -> SourceResult<Value> {
        let url = self.resource_url(kind)?;
        let mut req = self.client.get(url.clone()).query(params);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited {
                source_name: self.name.clone(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        let data: Value = serde_json::from_str(&text)?;
        debug!("[SOURCE] {} GET {} -> {} bytes", self.name, url.path(), text.len());
        Ok(data)
    }

    fn parse_quote(&self, ticker: &str, v: &Value) -> SourceResult<Quote> {
        let price = json_f64(v, "price")
            .or_else(|| json_f64(v, "last"))
            .ok_or_else(|| SourceError::Other(format!("quote for {} has no price", ticker)))?;
        let received_at = Utc::now();

        Ok(Quote {
            ticker: normalize_ticker(ticker),
            timestamp: json_timestamp(v, "timestamp").unwrap_or(received_at),
            price,
            volume: json_u64(v, "volume").unwrap_or(0),
            bid: json_f64(v, "bid"),
            ask: json_f64(v, "ask"),
            bid_size: json_u64(v, "bid_size"),
            ask_size: json_u64(v, "ask_size"),
            source: self.name.clone(),
            metadata: v.clone(),
            received_at,
        })
    }

    fn parse_article(&self, ticker: Option<&str>, v: &Value) -> Option<NewsArticle> {
        let headline = json_str(v, "headline").or_else(|| json_str(v, "title"))?;
        // No publish time means no stable natural key
        let published_at = json_timestamp(v, "published_at").or_else(|| json_timestamp(v, "published"))?;
        let received_at = Utc::now();
        let tickers = match ticker {
            Some(t) => vec![normalize_ticker(t)],
            None => json_tickers(v, "tickers"),
        };

        Some(NewsArticle {
            headline,
            content: json_str(v, "content"),
            summary: json_str(v, "summary"),
            url: json_str(v, "url"),
            source: self.name.clone(),
            published_at,
            received_at,
            tickers,
            sentiment_score: json_f64(v, "sentiment_score").filter(|s| (-1.0..=1.0).contains(s)),
            sentiment_label: json_str(v, "sentiment_label"),
            embedding: None,
            metadata: v.clone(),
        })
    }

    fn parse_bar(&self, ticker: &str, interval: BarInterval, v: &Value) -> Option<Bar> {
        let bucket = json_timestamp(v, "date")
            .or_else(|| json_timestamp(v, "timestamp"))
            .or_else(|| json_timestamp(v, "bucket"))?;

        Some(Bar {
            ticker: normalize_ticker(ticker),
            bucket,
            interval,
            open: json_f64(v, "open")?,
            high: json_f64(v, "high")?,
            low: json_f64(v, "low")?,
            close: json_f64(v, "close")?,
            volume: json_u64(v, "volume").unwrap_or(0),
            adj_close: json_f64(v, "adj_close"),
            source: self.name.clone(),
        })
    }
}

/// Accepts either a bare array or `{ "data": [...] }`.
fn as_items(data: &Value) -> &[Value] {
    match data {
        Value::Array(items) => items,
        Value::Object(_) => data
            .get("data")
            .and_then(|d| d.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[]),
        _ => &[],
    }
}

#[async_trait]
impl SourceAdapter for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    async fn fetch_quote(&self, ticker: &str) -> SourceResult<Quote> {
        let data = self
            .get_resource("quote", &[("symbol", normalize_ticker(ticker))])
            .await?;
        if data.is_null() {
            return Err(SourceError::Empty(ticker.to_string()));
        }
        self.parse_quote(ticker, &data)
    }

    async fn fetch_news(&self, ticker: Option<&str>, limit: usize) -> SourceResult<Vec<NewsArticle>> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(t) = ticker {
            params.push(("symbol", normalize_ticker(t)));
        }
        let data = self.get_resource("news", &params).await?;

        Ok(as_items(&data)
            .iter()
            .filter_map(|v| self.parse_article(ticker, v))
            .take(limit)
            .collect())
    }

    async fn fetch_historical(
        &self,
        ticker: &str,
        period: HistoryPeriod,
        interval: BarInterval,
    ) -> SourceResult<Vec<Bar>> {
        let params = [
            ("symbol", normalize_ticker(ticker)),
            ("period", period.as_str().to_string()),
            ("interval", interval.as_str().to_string()),
        ];
        let data = self.get_resource("historical", &params).await?;

        Ok(as_items(&data)
            .iter()
            .filter_map(|v| self.parse_bar(ticker, interval, v))
            .collect())
    }
}

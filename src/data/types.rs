use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CuratorError;

/// Canonical ticker form used everywhere inside the curator.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Midnight UTC of the instant's calendar date.
pub fn day_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|n| Utc.from_utc_datetime(&n))
        .unwrap_or(ts)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    /// Source clock
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: u64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub bid_size: Option<u64>,
    pub ask_size: Option<u64>,
    pub source: String,
    #[serde(default)]
    pub metadata: Value,
    /// Assigned on arrival, never by the source
    pub received_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(ticker: &str, timestamp: DateTime<Utc>, price: f64, volume: u64, source: &str) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            timestamp,
            price,
            volume,
            bid: None,
            ask: None,
            bid_size: None,
            ask_size: None,
            source: source.to_string(),
            metadata: Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn key(&self) -> QuoteKey {
        QuoteKey {
            ticker: self.ticker.clone(),
            timestamp: self.timestamp,
            source: self.source.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuoteKey {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BarInterval {
    #[serde(rename = "1min")]
    Minute1,
    #[serde(rename = "5min")]
    Minute5,
    #[serde(rename = "1hour")]
    Hour1,
    #[serde(rename = "1day")]
    Day1,
}

impl BarInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarInterval::Minute1 => "1min",
            BarInterval::Minute5 => "5min",
            BarInterval::Hour1 => "1hour",
            BarInterval::Day1 => "1day",
        }
    }

    pub fn is_daily(&self) -> bool {
        matches!(self, BarInterval::Day1)
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BarInterval {
    type Err = CuratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1min" | "1m" | "minute" => Ok(BarInterval::Minute1),
            "5min" | "5m" => Ok(BarInterval::Minute5),
            "1hour" | "1h" | "hour" => Ok(BarInterval::Hour1),
            "1day" | "1d" | "day" | "daily" => Ok(BarInterval::Day1),
            other => Err(CuratorError::Validation(format!(
                "unknown bar interval '{}' (expected 1min|5min|1hour|1day)",
                other
            ))),
        }
    }
}

/// Lookback window requested from a source for historical bars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryPeriod {
    #[serde(rename = "1D")]
    Day1,
    #[serde(rename = "1W")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
    #[serde(rename = "3M")]
    Month3,
    #[serde(rename = "1Y")]
    Year1,
    #[serde(rename = "5Y")]
    Year5,
}

impl HistoryPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryPeriod::Day1 => "1D",
            HistoryPeriod::Week1 => "1W",
            HistoryPeriod::Month1 => "1M",
            HistoryPeriod::Month3 => "3M",
            HistoryPeriod::Year1 => "1Y",
            HistoryPeriod::Year5 => "5Y",
        }
    }
}

impl fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryPeriod {
    type Err = CuratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1D" => Ok(HistoryPeriod::Day1),
            "1W" => Ok(HistoryPeriod::Week1),
            "1M" => Ok(HistoryPeriod::Month1),
            "3M" => Ok(HistoryPeriod::Month3),
            "1Y" => Ok(HistoryPeriod::Year1),
            "5Y" => Ok(HistoryPeriod::Year5),
            other => Err(CuratorError::Validation(format!(
                "unknown history period '{}' (expected 1D|1W|1M|3M|1Y|5Y)",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ticker: String,
    /// Start of the bucket; daily bars sit at 00:00 UTC of their date
    pub bucket: DateTime<Utc>,
    pub interval: BarInterval,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: Option<f64>,
    pub source: String,
}

impl Bar {
    pub fn key(&self) -> BarKey {
        BarKey {
            ticker: self.ticker.clone(),
            interval: self.interval,
            bucket: self.bucket,
            source: self.source.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BarKey {
    pub ticker: String,
    pub interval: BarInterval,
    pub bucket: DateTime<Utc>,
    pub source: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub headline: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub tickers: Vec<String>,
    /// In [-1.0, 1.0]
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<String>,
    /// Produced for downstream similarity search, never read here
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Value,
}

impl NewsArticle {
    pub fn key(&self) -> NewsKey {
        NewsKey {
            source: self.source.clone(),
            headline: self.headline.clone(),
            published_at: self.published_at,
        }
    }

    pub fn mentions(&self, ticker: &str) -> bool {
        self.tickers.iter().any(|t| t.eq_ignore_ascii_case(ticker))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NewsKey {
    pub source: String,
    pub headline: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Degraded,
    Down,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceStatus::Active => "active",
            SourceStatus::Degraded => "degraded",
            SourceStatus::Down => "down",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceHealthRecord {
    pub source: String,
    pub status: SourceStatus,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
    pub total_successes: u64,
    pub total_errors: u64,
}

impl SourceHealthRecord {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            status: SourceStatus::Active,
            last_success: None,
            last_error: None,
            consecutive_errors: 0,
            total_successes: 0,
            total_errors: 0,
        }
    }
}

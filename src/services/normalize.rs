//! Row -> record normalization for batch imports.
//!
//! Each `*_from_row` either yields a typed record or a short reason the row
//! was rejected. Column names match case-insensitively against alias lists.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::constants;
use crate::data::batch::{CellValue, Row};
use crate::data::parse::{parse_timestamp, split_tickers, timestamp_from_epoch};
use crate::data::types::{day_bucket, normalize_ticker, Bar, BarInterval, NewsArticle, Quote};

pub const TICKER: &[&str] = &["ticker", "symbol"];
pub const TIMESTAMP: &[&str] = &["timestamp", "time", "ts", "datetime"];
pub const PRICE: &[&str] = &["price", "last", "last_price"];
pub const VOLUME: &[&str] = &["volume", "vol", "qty"];
pub const BAR_DATE: &[&str] = &["date", "bucket", "timestamp", "time"];
const DAILY_BUCKET: &[&str] = &["date", "bucket"];
pub const OPEN: &[&str] = &["open"];
pub const HIGH: &[&str] = &["high"];
pub const LOW: &[&str] = &["low"];
pub const CLOSE: &[&str] = &["close"];
pub const HEADLINE: &[&str] = &["headline", "title"];
pub const CONTENT: &[&str] = &["content", "body"];
pub const PUBLISHED_AT: &[&str] = &["published_at", "published", "timestamp", "time"];
pub const NEWS_TICKERS: &[&str] = &["tickers", "symbols", "ticker", "symbol"];

const SOURCE: &[&str] = &["source"];

/// First non-null cell under any alias, in alias order.
fn cell<'a>(row: &'a Row, aliases: &[&str]) -> Option<&'a CellValue> {
    matched_cell(row, aliases).map(|(_, v)| v)
}

/// Like `cell`, but also reports which alias matched.
fn matched_cell<'a, 'b>(row: &'a Row, aliases: &[&'b str]) -> Option<(&'b str, &'a CellValue)> {
    aliases.iter().find_map(|alias| {
        row.iter()
            .find(|(k, v)| k.trim().eq_ignore_ascii_case(alias) && !v.is_null())
            .map(|(_, v)| (*alias, v))
    })
}

fn as_text(v: &CellValue) -> Option<String> {
    match v {
        CellValue::Text(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        CellValue::Number(n) if n.is_finite() => Some(n.to_string()),
        CellValue::List(items) => Some(items.join(",")).filter(|s| !s.is_empty()),
        CellValue::Timestamp(ts) => Some(ts.to_rfc3339()),
        _ => None,
    }
}

fn as_number(v: &CellValue) -> Option<f64> {
    match v {
        CellValue::Number(n) => Some(*n).filter(|n| n.is_finite()),
        CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn as_timestamp(v: &CellValue) -> Option<DateTime<Utc>> {
    match v {
        CellValue::Timestamp(ts) => Some(*ts),
        CellValue::Text(s) => parse_timestamp(s),
        CellValue::Number(n) => timestamp_from_epoch(*n),
        _ => None,
    }
}

fn text(row: &Row, aliases: &[&str]) -> Option<String> {
    cell(row, aliases).and_then(as_text)
}

fn required_ticker(row: &Row) -> Result<String, String> {
    text(row, TICKER)
        .map(|t| normalize_ticker(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "missing ticker".to_string())
}

fn required_number(row: &Row, aliases: &[&str]) -> Result<f64, String> {
    let v = cell(row, aliases).ok_or_else(|| format!("missing {}", aliases[0]))?;
    as_number(v).ok_or_else(|| format!("{} is not a number", aliases[0]))
}

/// Missing is fine; present but unparseable is not.
fn optional_number(row: &Row, aliases: &[&str]) -> Result<Option<f64>, String> {
    match cell(row, aliases) {
        None => Ok(None),
        Some(v) => as_number(v)
            .map(Some)
            .ok_or_else(|| format!("{} is not a number", aliases[0])),
    }
}

fn non_negative(value: f64, field: &str) -> Result<f64, String> {
    if value < 0.0 {
        Err(format!("negative {}", field))
    } else {
        Ok(value)
    }
}

fn volume(row: &Row) -> Result<u64, String> {
    match optional_number(row, VOLUME)? {
        Some(v) => Ok(non_negative(v, "volume")? as u64),
        None => Ok(0),
    }
}

fn optional_size(row: &Row, aliases: &[&str]) -> Result<Option<u64>, String> {
    match optional_number(row, aliases)? {
        Some(v) => Ok(Some(non_negative(v, aliases[0])? as u64)),
        None => Ok(None),
    }
}

fn required_timestamp(row: &Row, aliases: &[&str]) -> Result<DateTime<Utc>, String> {
    let v = cell(row, aliases).ok_or_else(|| format!("missing {}", aliases[0]))?;
    as_timestamp(v).ok_or_else(|| format!("unparseable {}", aliases[0]))
}

fn source(row: &Row) -> String {
    text(row, SOURCE).unwrap_or_else(|| constants::import::DEFAULT_SOURCE.to_string())
}

pub fn quote_from_row(row: &Row, batch: &str) -> Result<Quote, String> {
    let ticker = required_ticker(row)?;
    let timestamp = required_timestamp(row, TIMESTAMP)?;
    let price = non_negative(required_number(row, PRICE)?, "price")?;
    let volume = volume(row)?;

    let mut quote = Quote::new(&ticker, timestamp, price, volume, &source(row));
    quote.bid = optional_number(row, &["bid"])?;
    quote.ask = optional_number(row, &["ask"])?;
    quote.bid_size = optional_size(row, &["bid_size"])?;
    quote.ask_size = optional_size(row, &["ask_size"])?;
    quote.metadata = json!({ "batch": batch });
    Ok(quote)
}

/// Without an `interval` column a bar is daily only when its bucket came
/// from a date-style column or sits at midnight. An intraday timestamp
/// with no interval is rejected rather than collapsed onto its day.
pub fn bar_from_row(row: &Row) -> Result<Bar, String> {
    let ticker = required_ticker(row)?;
    let (alias, raw_bucket) = matched_cell(row, BAR_DATE).ok_or_else(|| format!("missing {}", BAR_DATE[0]))?;
    let mut bucket = as_timestamp(raw_bucket).ok_or_else(|| format!("unparseable {}", alias))?;

    let interval = match text(row, &["interval"]) {
        Some(raw) => raw.parse::<BarInterval>().map_err(|e| e.to_string())?,
        None if DAILY_BUCKET.contains(&alias) || day_bucket(bucket) == bucket => BarInterval::Day1,
        None => return Err(format!("intraday {} {} needs an interval", alias, bucket.to_rfc3339())),
    };
    if interval.is_daily() {
        bucket = day_bucket(bucket);
    }

    let open = non_negative(required_number(row, OPEN)?, "open")?;
    let high = non_negative(required_number(row, HIGH)?, "high")?;
    let low = non_negative(required_number(row, LOW)?, "low")?;
    let close = non_negative(required_number(row, CLOSE)?, "close")?;
    if high < low {
        return Err(format!("high {} below low {}", high, low));
    }

    Ok(Bar {
        ticker,
        bucket,
        interval,
        open,
        high,
        low,
        close,
        volume: volume(row)?,
        adj_close: optional_number(row, &["adj_close", "adjusted_close"])?,
        source: source(row),
    })
}

/// Headline and publish time are required; the publish time is part of the natural key.
pub fn article_from_row(row: &Row, batch: &str) -> Result<NewsArticle, String> {
    let headline = text(row, HEADLINE).ok_or_else(|| "missing headline".to_string())?;

    let sentiment_score = optional_number(row, &["sentiment_score", "sentiment"])?;
    if let Some(score) = sentiment_score {
        if !(-1.0..=1.0).contains(&score) {
            return Err(format!("sentiment {} outside [-1, 1]", score));
        }
    }

    let published_at = required_timestamp(row, PUBLISHED_AT)?;

    let tickers = match cell(row, NEWS_TICKERS) {
        Some(CellValue::List(items)) => items
            .iter()
            .map(|t| normalize_ticker(t))
            .filter(|t| !t.is_empty())
            .collect(),
        Some(CellValue::Text(s)) => split_tickers(s),
        _ => Vec::new(),
    };

    Ok(NewsArticle {
        headline,
        content: text(row, CONTENT),
        summary: text(row, &["summary"]),
        url: text(row, &["url"]),
        source: source(row),
        published_at,
        received_at: Utc::now(),
        tickers,
        sentiment_score,
        sentiment_label: text(row, &["sentiment_label"]),
        embedding: None,
        metadata: json!({ "batch": batch }),
    })
}

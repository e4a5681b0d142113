//! Lenient parsing helpers shared by source adapters and the importer.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use super::types::normalize_ticker;

/// Parses RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DDTHH:MM:SS[.f]`
/// (both read as UTC), a bare `YYYY-MM-DD` (midnight UTC) or an epoch number.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    s.parse::<f64>().ok().and_then(timestamp_from_epoch)
}

/// Interprets an epoch number, picking the unit by magnitude:
/// seconds, milliseconds, microseconds or nanoseconds.
pub fn timestamp_from_epoch(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let nanos = if n < 1e11 {
        n * 1e9
    } else if n < 1e14 {
        n * 1e6
    } else if n < 1e17 {
        n * 1e3
    } else {
        n
    };
    if nanos > i64::MAX as f64 {
        return None;
    }
    Some(Utc.timestamp_nanos(nanos as i64))
}

/// Splits a delimited ticker list (comma, semicolon, pipe or whitespace).
pub fn split_tickers(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c == '|' || c.is_whitespace())
        .map(normalize_ticker)
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn json_f64(v: &Value, key: &str) -> Option<f64> {
    match v.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn json_u64(v: &Value, key: &str) -> Option<u64> {
    json_f64(v, key).filter(|n| *n >= 0.0).map(|n| n as u64)
}

pub fn json_str(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

pub fn json_timestamp(v: &Value, key: &str) -> Option<DateTime<Utc>> {
    match v.get(key)? {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_f64().and_then(timestamp_from_epoch),
        _ => None,
    }
}

pub fn json_tickers(v: &Value, key: &str) -> Vec<String> {
    match v.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.as_str())
            .map(normalize_ticker)
            .filter(|t| !t.is_empty())
            .collect(),
        Some(Value::String(s)) => split_tickers(s),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn test_parse_rfc3339_and_naive_forms() {
        let a = parse_timestamp("2025-01-02T03:04:05Z").unwrap();
        let b = parse_timestamp("2025-01-02 03:04:05").unwrap();
        assert_eq!(a, b);

        let d = parse_timestamp("2025-01-02").unwrap();
        assert_eq!(d.day(), 2);
        assert_eq!(d.timestamp() % 86_400, 0);
    }

    #[test]
    fn test_epoch_unit_detection() {
        let secs = timestamp_from_epoch(1_735_689_600.0).unwrap();
        let millis = timestamp_from_epoch(1_735_689_600_000.0).unwrap();
        let nanos = timestamp_from_epoch(1_735_689_600_000_000_000.0).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs, nanos);
        assert!(timestamp_from_epoch(-1.0).is_none());
    }

    #[test]
    fn test_garbage_timestamp_is_none() {
        assert!(parse_timestamp("not a time").is_none());
        assert!(parse_timestamp("   ").is_none());
    }

    #[test]
    fn test_split_tickers_mixed_delimiters() {
        assert_eq!(split_tickers("aapl, msft;tsla|goog"), vec!["AAPL", "MSFT", "TSLA", "GOOG"]);
        assert!(split_tickers(" , ").is_empty());
    }

    #[test]
    fn test_json_helpers_accept_numeric_strings() {
        let v = json!({"price": "12.5", "volume": 100, "tickers": "aapl,msft", "empty": ""});
        assert_eq!(json_f64(&v, "price"), Some(12.5));
        assert_eq!(json_u64(&v, "volume"), Some(100));
        assert_eq!(json_tickers(&v, "tickers"), vec!["AAPL", "MSFT"]);
        assert_eq!(json_str(&v, "empty"), None);
    }
}

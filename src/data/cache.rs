use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::types::{normalize_ticker, Quote};

#[derive(Clone, Debug)]
struct CacheEntry {
    quote: Quote,
    cached_at: Instant,
}

/// TTL-bound map of ticker -> most recent quote.
///
/// One mutex guards the whole map; contention is low next to fetch latency.
/// Concurrent writers are last-writer-wins.
#[derive(Clone, Debug)]
pub struct QuoteCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the cached quote and whether it counts as a hit.
    ///
    /// A stale entry is still handed back with `hit == false` so callers can
    /// decide whether a stale value beats nothing; refreshing is their job.
    pub fn get(&self, ticker: &str) -> (Option<Quote>, bool) {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(&normalize_ticker(ticker)) {
            Some(entry) => {
                let fresh = entry.cached_at.elapsed() < self.ttl;
                (Some(entry.quote.clone()), fresh)
            }
            None => (None, false),
        }
    }

    pub fn put(&self, ticker: &str, quote: Quote) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            normalize_ticker(ticker),
            CacheEntry {
                quote,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn is_fresh(&self, ticker: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&normalize_ticker(ticker))
            .map(|e| e.cached_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Drops expired entries, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.cached_at.elapsed() < ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

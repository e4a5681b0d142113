use std::sync::{Arc, Mutex};

use tracing::info;

use crate::data::types::normalize_ticker;

/// Insertion-ordered set of tickers the worker keeps fresh.
#[derive(Clone, Debug, Default)]
pub struct Watchlist {
    tickers: Arc<Mutex<Vec<String>>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tickers<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = Self::new();
        for t in tickers {
            list.add(t.as_ref());
        }
        list
    }

    /// Returns false for blank tickers and tickers already present.
    pub fn add(&self, ticker: &str) -> bool {
        let ticker = normalize_ticker(ticker);
        if ticker.is_empty() {
            return false;
        }
        let mut tickers = self.tickers.lock().unwrap_or_else(|e| e.into_inner());
        if tickers.contains(&ticker) {
            return false;
        }
        info!("📋 [WATCHLIST] + {}", ticker);
        tickers.push(ticker);
        true
    }

    pub fn remove(&self, ticker: &str) -> bool {
        let ticker = normalize_ticker(ticker);
        let mut tickers = self.tickers.lock().unwrap_or_else(|e| e.into_inner());
        match tickers.iter().position(|t| *t == ticker) {
            Some(idx) => {
                tickers.remove(idx);
                info!("📋 [WATCHLIST] - {}", ticker);
                true
            }
            None => false,
        }
    }

    /// Snapshot copy; later mutations do not affect it.
    pub fn list(&self) -> Vec<String> {
        self.tickers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        let ticker = normalize_ticker(ticker);
        self.tickers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&ticker)
    }

    pub fn len(&self) -> usize {
        self.tickers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Process-wide counters and per-source health.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::HealthConfig;
use crate::constants;
use crate::data::store::DataStore;
use crate::data::types::{SourceHealthRecord, SourceStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthThresholds {
    pub degraded_after: u32,
    pub down_after: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_after: constants::health::DEFAULT_DEGRADED_AFTER,
            down_after: constants::health::DEFAULT_DOWN_AFTER,
        }
    }
}

impl From<&HealthConfig> for HealthThresholds {
    fn from(c: &HealthConfig) -> Self {
        Self {
            degraded_after: c.degraded_after,
            down_after: c.down_after,
        }
    }
}

impl HealthThresholds {
    /// Status is a pure function of the consecutive-error count.
    pub fn status_for(&self, consecutive_errors: u32) -> SourceStatus {
        if consecutive_errors >= self.down_after {
            SourceStatus::Down
        } else if consecutive_errors >= self.degraded_after {
            SourceStatus::Degraded
        } else {
            SourceStatus::Active
        }
    }
}

/// Status before and after recording one fetch attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub from: SourceStatus,
    pub to: SourceStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

pub struct StatsTracker {
    counters: DashMap<String, AtomicU64>,
    health: DashMap<String, SourceHealthRecord>,
    thresholds: HealthThresholds,
}

impl StatsTracker {
    pub fn new(thresholds: HealthThresholds) -> Self {
        let counters = DashMap::new();
        for name in constants::stats::ALL {
            counters.insert(name.to_string(), AtomicU64::new(0));
        }
        Self {
            counters,
            health: DashMap::new(),
            thresholds,
        }
    }

    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, n: u64) {
        if n == 0 {
            return;
        }
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(n, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// All counters, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// Makes a configured source visible to health checks before its first fetch.
    pub fn register_source(&self, source: &str) {
        self.health
            .entry(source.to_string())
            .or_insert_with(|| SourceHealthRecord::new(source));
    }

    pub fn source_health(&self, source: &str) -> Option<SourceHealthRecord> {
        self.health.get(source).map(|r| r.clone())
    }

    pub fn all_source_health(&self) -> Vec<SourceHealthRecord> {
        let mut out: Vec<SourceHealthRecord> = self.health.iter().map(|r| r.clone()).collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }

    pub fn record_success(&self, source: &str) -> StatusChange {
        let mut record = self
            .health
            .entry(source.to_string())
            .or_insert_with(|| SourceHealthRecord::new(source));
        let from = record.status;
        record.consecutive_errors = 0;
        record.total_successes += 1;
        record.last_success = Some(Utc::now());
        record.status = self.thresholds.status_for(0);

        let change = StatusChange { from, to: record.status };
        if change.changed() {
            info!("✅ [HEALTH] {} recovered: {} -> {}", source, from, record.status);
        }
        change
    }

    pub fn record_failure(&self, source: &str, error: &str) -> StatusChange {
        let mut record = self
            .health
            .entry(source.to_string())
            .or_insert_with(|| SourceHealthRecord::new(source));
        let from = record.status;
        record.consecutive_errors = record.consecutive_errors.saturating_add(1);
        record.total_errors += 1;
        record.last_error = Some(error.to_string());
        record.status = self.thresholds.status_for(record.consecutive_errors);

        let change = StatusChange { from, to: record.status };
        if change.changed() {
            warn!(
                "⚠️ [HEALTH] {} {} -> {} after {} consecutive errors (last: {})",
                source, from, record.status, record.consecutive_errors, error
            );
        }
        change
    }

    pub fn down_sources(&self) -> Vec<String> {
        self.health
            .iter()
            .filter(|r| r.status == SourceStatus::Down)
            .map(|r| r.source.clone())
            .collect()
    }

    pub async fn overall_healthy(&self, store: &dyn DataStore) -> bool {
        self.healthy_with_store(store.health_check().await)
    }

    /// Store answers its liveness check and no source is down. Degraded is fine.
    pub fn healthy_with_store(&self, store_healthy: bool) -> bool {
        store_healthy && self.down_sources().is_empty()
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}

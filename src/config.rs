use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;
use crate::error::{CuratorError, CuratorResult};

#[derive(Clone, Debug, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Start polling as soon as the binary boots
    #[serde(default)]
    pub autostart: bool,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_news_limit")]
    pub news_limit: usize,
    /// 0 disables the periodic news sweep
    #[serde(default = "default_news_every_ticks")]
    pub news_every_ticks: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            autostart: false,
            max_concurrency: default_max_concurrency(),
            news_limit: default_news_limit(),
            news_every_ticks: default_news_every_ticks(),
        }
    }
}

impl WorkerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,
    #[serde(default = "default_down_after")]
    pub down_after: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_after: default_degraded_after(),
            down_after: default_down_after(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_true")]
    pub deduplicate: bool,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Local directory of JSON batch files for `/import`
    pub batch_dir: Option<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            deduplicate: true,
            max_files: default_max_files(),
            batch_dir: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Adapter kind, e.g. "fetch"
    #[serde(rename = "type")]
    pub kind: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Environment variable holding the api key; wins over `api_key`
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Lower is tried first
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub quotes: bool,
    #[serde(default = "default_true")]
    pub news: bool,
    #[serde(default = "default_true")]
    pub historical: bool,
}

impl SourceConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .or_else(|| self.api_key.clone())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CuratorConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Tickers added to the watchlist at startup
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            watchlist: Vec::new(),
            worker: WorkerConfig::default(),
            health: HealthConfig::default(),
            import: ImportConfig::default(),
            sources: Vec::new(),
            server: ServerConfig::default(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    constants::cache::DEFAULT_TTL_SECS
}
fn default_interval_secs() -> u64 {
    constants::worker::DEFAULT_INTERVAL_SECS
}
fn default_max_concurrency() -> usize {
    constants::worker::DEFAULT_MAX_CONCURRENCY
}
fn default_news_limit() -> usize {
    constants::worker::DEFAULT_NEWS_LIMIT
}
fn default_news_every_ticks() -> u64 {
    constants::worker::DEFAULT_NEWS_EVERY_TICKS
}
fn default_degraded_after() -> u32 {
    constants::health::DEFAULT_DEGRADED_AFTER
}
fn default_down_after() -> u32 {
    constants::health::DEFAULT_DOWN_AFTER
}
fn default_chunk_size() -> usize {
    constants::import::DEFAULT_CHUNK_SIZE
}
fn default_max_files() -> usize {
    constants::import::DEFAULT_MAX_FILES
}
fn default_timeout_secs() -> u64 {
    constants::source::DEFAULT_TIMEOUT_SECS
}
fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_true() -> bool {
    true
}

impl CuratorConfig {
    /// Reads `CURATOR_CONFIG` (default `config.yaml`). A missing file yields defaults.
    pub fn load() -> CuratorResult<Self> {
        let path = std::env::var("CURATOR_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
        match fs::read_to_string(&path) {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("⚠️ {} not found, using default configuration", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_yaml(content: &str) -> CuratorResult<Self> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let content = if content.trim().is_empty() { "{}" } else { content };

        let config: CuratorConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CuratorResult<()> {
        if self.worker.interval_secs == 0 {
            return Err(CuratorError::Configuration(
                "worker.interval_secs must be > 0".to_string(),
            ));
        }
        if self.worker.max_concurrency == 0 {
            return Err(CuratorError::Configuration(
                "worker.max_concurrency must be > 0".to_string(),
            ));
        }
        if self.health.degraded_after == 0 || self.health.down_after <= self.health.degraded_after {
            return Err(CuratorError::Configuration(format!(
                "health thresholds must satisfy 0 < degraded_after ({}) < down_after ({})",
                self.health.degraded_after, self.health.down_after
            )));
        }
        if self.import.chunk_size == 0 {
            return Err(CuratorError::Configuration(
                "import.chunk_size must be > 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(CuratorError::Configuration(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

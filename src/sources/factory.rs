use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::SourceConfig;
use crate::error::{CuratorError, CuratorResult};

use super::{
    http::HttpSource,
    traits::{SourceAdapter, SourceCapabilities},
};

/// Resolves the configured sources once, in priority order (lowest first,
/// ties keep config order). Disabled entries are skipped.
pub fn build_sources(configs: &[SourceConfig]) -> CuratorResult<Vec<Arc<dyn SourceAdapter>>> {
    let mut enabled: Vec<&SourceConfig> = configs.iter().filter(|c| c.enabled).collect();
    enabled.sort_by_key(|c| c.priority);

    let mut out: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(enabled.len());
    for config in enabled {
        out.push(build_source(config)?);
    }
    Ok(out)
}

pub fn build_source(config: &SourceConfig) -> CuratorResult<Arc<dyn SourceAdapter>> {
    let capabilities = SourceCapabilities {
        quotes: config.quotes,
        news: config.news,
        historical: config.historical,
    };

    match config.kind.to_lowercase().as_str() {
        "fetch" | "http" => {
            let base_url = config.base_url.as_deref().ok_or_else(|| {
                CuratorError::Configuration(format!("source '{}' needs a base_url", config.name))
            })?;
            let source = HttpSource::new(
                &config.name,
                base_url,
                config.resolved_api_key(),
                Duration::from_secs(config.timeout_secs),
                capabilities,
            )
            .map_err(|e| CuratorError::Configuration(format!("source '{}': {}", config.name, e)))?;
            info!("🔌 [SOURCE] {} -> {} (priority {})", config.name, base_url, config.priority);
            Ok(Arc::new(source))
        }
        other => Err(CuratorError::Configuration(format!(
            "unknown source type '{}' for '{}' (expected fetch|http)",
            other, config.name
        ))),
    }
}

//! Unit tests for configuration structures and parsing.

#[cfg(test)]
mod config_tests {
    use crate::config::*;
    use crate::error::CuratorError;

    // ============= Defaults Tests =============

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();

        assert_eq!(config.interval_secs, 60);
        assert!(!config.autostart);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.news_limit, 20);
        assert_eq!(config.news_every_ticks, 1);
        assert_eq!(config.interval().as_secs(), 60);
    }

    #[test]
    fn test_health_and_import_defaults() {
        let health = HealthConfig::default();
        assert_eq!(health.degraded_after, 3);
        assert_eq!(health.down_after, 10);

        let import = ImportConfig::default();
        assert_eq!(import.chunk_size, 1000);
        assert!(import.deduplicate);
        assert_eq!(import.max_files, 100);
        assert!(import.batch_dir.is_none());
    }

    #[test]
    fn test_empty_yaml_is_all_defaults() {
        let config = CuratorConfig::from_yaml("").unwrap();

        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.cache_ttl().as_secs(), 300);
        assert!(config.watchlist.is_empty());
        assert!(config.sources.is_empty());
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_bom_is_stripped() {
        let config = CuratorConfig::from_yaml("\u{feff}cache_ttl_secs: 5\n").unwrap();
        assert_eq!(config.cache_ttl_secs, 5);
    }

    // ============= Full Config Tests =============

    #[test]
    fn test_full_config_deserialize() {
        let yaml = r#"
cache_ttl_secs: 30
watchlist: [AAPL, msft]
worker:
  interval_secs: 15
  autostart: true
  max_concurrency: 4
  news_limit: 5
  news_every_ticks: 0
health:
  degraded_after: 2
  down_after: 5
import:
  chunk_size: 250
  deduplicate: false
  batch_dir: ./batches
sources:
  - name: primary
    type: fetch
    base_url: http://localhost:8080
    api_key: secret
    priority: 1
    news: false
server:
  bind: 127.0.0.1:9000
"#;
        let config = CuratorConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.cache_ttl_secs, 30);
        assert_eq!(config.watchlist, vec!["AAPL", "msft"]);
        assert_eq!(config.worker.interval_secs, 15);
        assert!(config.worker.autostart);
        assert_eq!(config.worker.max_concurrency, 4);
        assert_eq!(config.worker.news_every_ticks, 0);
        assert_eq!(config.health.degraded_after, 2);
        assert_eq!(config.import.chunk_size, 250);
        assert!(!config.import.deduplicate);
        assert_eq!(config.import.batch_dir.as_deref(), Some(std::path::Path::new("./batches")));
        assert_eq!(config.server.bind, "127.0.0.1:9000");

        let source = &config.sources[0];
        assert_eq!(source.kind, "fetch");
        assert_eq!(source.priority, 1);
        assert_eq!(source.timeout_secs, 10);
        assert!(source.enabled);
        assert!(source.quotes);
        assert!(!source.news);
        assert_eq!(source.resolved_api_key().as_deref(), Some("secret"));
    }

    #[test]
    fn test_api_key_env_wins() {
        std::env::set_var("CURATOR_TEST_SOURCE_KEY", "from-env");
        let yaml = r#"
sources:
  - name: primary
    type: fetch
    base_url: http://localhost:8080
    api_key: inline
    api_key_env: CURATOR_TEST_SOURCE_KEY
"#;
        let config = CuratorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.sources[0].resolved_api_key().as_deref(), Some("from-env"));
    }

    #[test]
    fn test_missing_api_key_env_falls_back() {
        let yaml = r#"
sources:
  - name: primary
    type: fetch
    api_key_env: CURATOR_TEST_UNSET_KEY_VAR
"#;
        let config = CuratorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.sources[0].resolved_api_key(), None);
    }

    // ============= Validation Tests =============

    #[test]
    fn test_zero_interval_rejected() {
        let err = CuratorConfig::from_yaml("worker:\n  interval_secs: 0\n").unwrap_err();
        assert!(matches!(err, CuratorError::Configuration(_)));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(CuratorConfig::from_yaml("worker:\n  max_concurrency: 0\n").is_err());
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let yaml = "health:\n  degraded_after: 5\n  down_after: 5\n";
        assert!(CuratorConfig::from_yaml(yaml).is_err());

        let yaml = "health:\n  degraded_after: 0\n  down_after: 5\n";
        assert!(CuratorConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(CuratorConfig::from_yaml("import:\n  chunk_size: 0\n").is_err());
    }

    #[test]
    fn test_duplicate_source_names_rejected() {
        let yaml = r#"
sources:
  - name: a
    type: fetch
  - name: a
    type: fetch
"#;
        let err = CuratorConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate source name"));
    }

    #[test]
    fn test_malformed_yaml_is_configuration_error() {
        let err = CuratorConfig::from_yaml("worker: [not, a, map").unwrap_err();
        assert!(matches!(err, CuratorError::Configuration(_)));
    }

    #[test]
    fn test_config_clone() {
        let config = CuratorConfig::default();
        let cloned = config.clone();
        assert_eq!(cloned.cache_ttl_secs, config.cache_ttl_secs);
        assert_eq!(cloned.worker.interval_secs, config.worker.interval_secs);
    }
}

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid evaluation_interval_secs: {0}. Must be greater than zero")]
    InvalidEvaluationInterval(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid collector '{0}': type cannot be empty")]
    EmptyCollectorType(String),

    #[error("Invalid prometheus port: 0 is not a valid port")]
    InvalidPrometheusPort,

    #[error("Invalid channel '{0}': retry_attempts cannot be zero")]
    InvalidRetryAttempts(String),

    #[error("Invalid storage backend: {0}")]
    InvalidStorageBackend(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .agentwatch/config.yaml (project config)
    /// 3. .agentwatch/local.yaml (project local overrides, optional)
    /// 4. `AGENTWATCH_*`-prefixed environment variables
    /// 5. Narrow drop-in overrides: `METRICS_DB_PATH`, `METRICS_RETENTION_DAYS`,
    ///    `EVALUATION_INTERVAL_SECONDS`, `HOOK_MAX_CONCURRENT` (§6)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".agentwatch/config.yaml"))
            .merge(Yaml::file(".agentwatch/local.yaml"))
            .merge(Env::prefixed("AGENTWATCH_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        let config = Self::apply_narrow_env_overrides(config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, bypassing the project-local
    /// discovery path. Used by tests and by explicit `--config` style callers.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Applies the legacy, narrowly-scoped environment variables documented
    /// for drop-in deployments, after the hierarchical merge. These win over
    /// everything because an operator setting one expects it to take effect
    /// regardless of what the YAML files say.
    fn apply_narrow_env_overrides(mut config: Config) -> Config {
        if let Ok(path) = std::env::var("METRICS_DB_PATH") {
            config
                .storage
                .config
                .insert("path".to_string(), serde_json::Value::String(path));
        }
        if let Ok(days) = std::env::var("METRICS_RETENTION_DAYS") {
            if let Ok(days) = days.parse::<u64>() {
                config.storage.retention.rules.push(
                    crate::domain::models::config::RetentionRuleConfig {
                        pattern: "*".to_string(),
                        label_filters: Default::default(),
                        retention_secs: days * 24 * 3600,
                        priority: i32::MIN,
                        min_points_to_keep: 0,
                    },
                );
            }
        }
        if let Ok(secs) = std::env::var("EVALUATION_INTERVAL_SECONDS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.alerts.evaluation_interval_secs = secs;
            }
        }
        if let Ok(max) = std::env::var("HOOK_MAX_CONCURRENT") {
            if let Ok(max) = max.parse::<u64>() {
                config.runtime.hook_max_concurrent = Some(max);
            }
        }
        config
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.alerts.evaluation_interval_secs == 0 {
            return Err(ConfigError::InvalidEvaluationInterval(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.global.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.global.log_level.clone()));
        }

        for (name, collector) in &config.collectors {
            if collector.collector_type.is_empty() {
                return Err(ConfigError::EmptyCollectorType(name.clone()));
            }
        }

        if config.prometheus.enabled && config.prometheus.port == 0 {
            return Err(ConfigError::InvalidPrometheusPort);
        }

        for channel in &config.notifications.channels {
            if channel.retry_attempts == 0 {
                return Err(ConfigError::InvalidRetryAttempts(channel.name.clone()));
            }
        }

        let valid_backends = ["memory", "file"];
        if !valid_backends.contains(&config.storage.backend.as_str()) {
            return Err(ConfigError::InvalidStorageBackend(
                config.storage.backend.clone(),
            ));
        }

        for rule in &config.notifications.routing {
            if rule.channels.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "routing rule targeting {:?} names no channels",
                    rule.rule_name_glob
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.alerts.evaluation_interval_secs, 30);
        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.storage.backend, "memory");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
global:
  log_level: debug
alerts:
  evaluation_interval_secs: 15
storage:
  backend: file
prometheus:
  enabled: true
  port: 9100
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.global.log_level, "debug");
        assert_eq!(config.alerts.evaluation_interval_secs, 15);
        assert_eq!(config.storage.backend, "file");
        assert!(config.prometheus.enabled);
        assert_eq!(config.prometheus.port, 9100);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_evaluation_interval() {
        let mut config = Config::default();
        config.alerts.evaluation_interval_secs = 0;

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidEvaluationInterval(0)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.global.log_level = "invalid".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        match result.unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_storage_backend() {
        let mut config = Config::default();
        config.storage.backend = "sqlite".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidStorageBackend(_)
        ));
    }

    #[test]
    fn test_validate_prometheus_port_zero_when_enabled() {
        let mut config = Config::default();
        config.prometheus.enabled = true;
        config.prometheus.port = 0;

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidPrometheusPort
        ));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            env::set_var("AGENTWATCH_GLOBAL__LOG_LEVEL", "debug");
            env::set_var("AGENTWATCH_ALERTS__EVALUATION_INTERVAL_SECS", "45");
        }

        assert_eq!(
            env::var("AGENTWATCH_GLOBAL__LOG_LEVEL").unwrap(),
            "debug"
        );
        assert_eq!(
            env::var("AGENTWATCH_ALERTS__EVALUATION_INTERVAL_SECS").unwrap(),
            "45"
        );

        unsafe {
            env::remove_var("AGENTWATCH_GLOBAL__LOG_LEVEL");
            env::remove_var("AGENTWATCH_ALERTS__EVALUATION_INTERVAL_SECS");
        }
    }

    #[test]
    fn test_narrow_override_wins_for_evaluation_interval() {
        unsafe {
            env::set_var("EVALUATION_INTERVAL_SECONDS", "90");
        }
        let config = ConfigLoader::apply_narrow_env_overrides(Config::default());
        assert_eq!(config.alerts.evaluation_interval_secs, 90);
        unsafe {
            env::remove_var("EVALUATION_INTERVAL_SECONDS");
        }
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "global:\n  log_level: info\nalerts:\n  evaluation_interval_secs: 20"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "global:\n  log_level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.global.log_level, "debug", "Override should win");
        assert_eq!(
            config.alerts.evaluation_interval_secs, 20,
            "Base value should persist when not overridden"
        );
    }
}

//! Top-level configuration schema (§6 "Config file schema").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub collectors: HashMap<String, CollectorConfig>,

    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collectors: HashMap::new(),
            global: GlobalConfig::default(),
            runtime: RuntimeConfig::default(),
            storage: StorageConfig::default(),
            alerts: AlertsConfig::default(),
            notifications: NotificationsConfig::default(),
            prometheus: PrometheusConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CollectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "type")]
    pub collector_type: String,
    pub collection_interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub custom_labels: HashMap<String, String>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    #[serde(default = "default_collection_interval")]
    pub default_collection_interval_secs: u64,
    #[serde(default = "default_collector_timeout")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub default_retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub default_retry_delay_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_collection_interval_secs: default_collection_interval(),
            default_timeout_secs: default_collector_timeout(),
            default_retry_attempts: default_retry_attempts(),
            default_retry_delay_ms: default_retry_delay(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RuntimeConfig {
    #[serde(default = "default_preferred_runtime")]
    pub preferred: String,
    /// Global cap on concurrently-executing hooks (§4.3/§5). `None` defers to
    /// the dispatcher's own built-in default.
    #[serde(default)]
    pub hook_max_concurrent: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            preferred: default_preferred_runtime(),
            hook_max_concurrent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            config: HashMap::new(),
            retention: RetentionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetentionConfig {
    #[serde(default = "default_true")]
    pub with_defaults: bool,
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
    #[serde(default)]
    pub rules: Vec<RetentionRuleConfig>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            with_defaults: true,
            cleanup_interval_hours: default_cleanup_interval_hours(),
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetentionRuleConfig {
    pub pattern: String,
    #[serde(default)]
    pub label_filters: HashMap<String, String>,
    pub retention_secs: u64,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub min_points_to_keep: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AlertsConfig {
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,
    #[serde(default = "default_alert_retention_period")]
    pub retention_period_secs: u64,
    #[serde(default = "default_max_alerts")]
    pub max_alerts: usize,
    #[serde(default = "default_resolve_timeout")]
    pub default_resolve_timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: default_evaluation_interval(),
            retention_period_secs: default_alert_retention_period(),
            max_alerts: default_max_alerts(),
            default_resolve_timeout_secs: default_resolve_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationsConfig {
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub routing: Vec<RoutingRuleConfig>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            routing: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RoutingRuleConfig {
    #[serde(default)]
    pub severities: Vec<String>,
    #[serde(default)]
    pub label_equals: HashMap<String, String>,
    pub rule_name_glob: Option<String>,
    pub channels: Vec<String>,
    /// Name of a template registered via `NotificationRouter::add_template`,
    /// tried before the `default_<severity>`/`default` fallback tiers (§4.7).
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_prometheus_port")]
    pub port: u16,
    #[serde(default = "default_prometheus_path")]
    pub path: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_prometheus_port(),
            path: default_prometheus_path(),
        }
    }
}

fn default_true() -> bool {
    true
}
const fn default_collection_interval() -> u64 {
    15
}
const fn default_collector_timeout() -> u64 {
    10
}
const fn default_retry_attempts() -> u32 {
    3
}
const fn default_retry_delay() -> u64 {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_preferred_runtime() -> String {
    "docker".to_string()
}
fn default_storage_backend() -> String {
    "memory".to_string()
}
const fn default_cleanup_interval_hours() -> u64 {
    1
}
const fn default_evaluation_interval() -> u64 {
    30
}
const fn default_alert_retention_period() -> u64 {
    7 * 24 * 3600
}
const fn default_max_alerts() -> usize {
    1000
}
const fn default_resolve_timeout() -> u64 {
    300
}
const fn default_prometheus_port() -> u16 {
    9090
}
fn default_prometheus_path() -> String {
    "/metrics".to_string()
}

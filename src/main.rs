//! Process entry point: loads configuration, wires the owned singletons
//! together, starts the background tasks, and drains them on shutdown.
//!
//! The HTTP scrape server, the CLI/flag parsing layer, and any
//! OS-notification-backed file watcher are external collaborators this
//! binary does not implement; it owns everything from the event bus through
//! collection, retention, alerting, and hook dispatch.

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use agentwatch::domain::models::{
    CollectorConfig, Collector, Event, EventFilter, EventPayload, EventSeverity, LifecycleAction,
    LifecycleEvent, RetentionRule,
};
use agentwatch::domain::CoreError;
use agentwatch::infrastructure::config::ConfigLoader;
use agentwatch::infrastructure::logging::{LogConfig, LoggerImpl};
use agentwatch::infrastructure::runtime_adapter::{CliRuntimeAdapter, RuntimeAdapter};
use agentwatch::services::{
    channel_from_config, AlertManager, CollectorRegistry, CpuCollector, DiskCollector, EventBus,
    EventBusConfig, EventHandler, FileBackedStore, HookDispatcher, HookRegistry, InMemoryStore,
    LifecycleCollector, LifecycleManager, MemoryCollector, NetworkCollector, NotificationRouter,
    RetentionEngine, RuntimeProbe, TimeSeriesStore,
};

/// Fallback retention applied to series no rule matches, and the seed for
/// `storage.retention.with_defaults` (§6, §11 of the expanded spec leaves the
/// exact duration unspecified; a week mirrors the alert history default).
const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

enum Shutdown {
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(Shutdown::Interrupted) => ExitCode::from(130),
        Err(err) => {
            eprintln!("agentwatch exited with an error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<Shutdown> {
    let config = ConfigLoader::load().context("loading configuration")?;

    let log_config = LogConfig {
        level: config.global.log_level.clone(),
        ..LogConfig::default()
    };
    let _logger_guard = LoggerImpl::init(&log_config).context("initializing logger")?;
    info!(runtime = %config.runtime.preferred, "agentwatch starting");

    let timeout = Duration::from_secs(config.global.default_timeout_secs);
    let docker: Arc<dyn RuntimeAdapter> = Arc::new(CliRuntimeAdapter::docker(timeout));
    let podman: Arc<dyn RuntimeAdapter> = Arc::new(CliRuntimeAdapter::new("podman", timeout));
    let adapters: Vec<(String, Arc<dyn RuntimeAdapter>)> = if config.runtime.preferred == "podman" {
        vec![("podman".to_string(), podman), ("docker".to_string(), docker)]
    } else {
        vec![("docker".to_string(), docker), ("podman".to_string(), podman)]
    };

    let store: Arc<dyn TimeSeriesStore> = match config.storage.backend.as_str() {
        "file" => {
            let path = config
                .storage
                .config
                .get("path")
                .and_then(|v| v.as_str())
                .unwrap_or("agentwatch.tsdb");
            Arc::new(
                FileBackedStore::open(path, 10_000)
                    .await
                    .context("opening file-backed time-series store")?,
            )
        }
        _ => Arc::new(InMemoryStore::default()),
    };

    let retention_engine = Arc::new(RetentionEngine::new(Arc::clone(&store), DEFAULT_RETENTION));
    if config.storage.retention.with_defaults {
        retention_engine
            .add_rule(RetentionRule::new("*", DEFAULT_RETENTION, i32::MIN))
            .await;
    }
    for rule_config in &config.storage.retention.rules {
        let mut rule = RetentionRule::new(
            rule_config.pattern.clone(),
            Duration::from_secs(rule_config.retention_secs),
            rule_config.priority,
        );
        rule.label_filters = rule_config.label_filters.clone();
        rule.min_points_to_keep = rule_config.min_points_to_keep;
        retention_engine.add_rule(rule).await;
    }

    let hook_registry = Arc::new(HookRegistry::new());
    let max_concurrent_hooks = config.runtime.hook_max_concurrent.unwrap_or(10) as usize;
    let hook_dispatcher = Arc::new(HookDispatcher::new(Arc::clone(&hook_registry), max_concurrent_hooks));

    let mut router = NotificationRouter::new(
        config.global.default_retry_attempts,
        Duration::from_millis(config.global.default_retry_delay_ms),
    );
    router.add_template("default", "[{{severity}}] {{rule_name}}: {{message}}");
    for channel_config in config.notifications.channels.iter().filter(|c| c.enabled) {
        let channel = channel_from_config(channel_config).context("constructing notification channel")?;
        router.register_channel(channel);
    }
    for routing_config in &config.notifications.routing {
        router
            .add_routing_rule(routing_config)
            .context("adding notification routing rule")?;
    }
    let router = Arc::new(router);

    let alert_manager = Arc::new(AlertManager::new(
        Arc::clone(&store),
        Arc::clone(&router),
        config.alerts.max_alerts,
        Duration::from_secs(config.alerts.evaluation_interval_secs),
    ));

    let collector_configs = if config.collectors.is_empty() {
        default_collector_configs()
    } else {
        config.collectors.clone()
    };
    let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
    for (name, collector_config) in &collector_configs {
        if !collector_config.enabled {
            continue;
        }
        let probe = RuntimeProbe::new(adapters.clone());
        match build_collector(&collector_config.collector_type, probe) {
            Some(collector) => collectors.push(collector),
            None => warn!(collector = name.as_str(), kind = collector_config.collector_type.as_str(), "unknown collector type, skipping"),
        }
    }
    let collector_registry = Arc::new(CollectorRegistry::new(collectors));
    collector_registry.initialize_all().await;

    let lifecycle_manager = Arc::new(LifecycleManager::new(Arc::clone(&store), 3_600_000, 24 * 3_600_000));

    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    bus.subscribe(
        ["lifecycle".to_string()],
        EventFilter::default(),
        100,
        Arc::clone(&lifecycle_manager) as Arc<dyn EventHandler>,
    )
    .await;
    bus.subscribe(
        Vec::<String>::new(),
        EventFilter::default(),
        0,
        Arc::new(HookDispatchHandler { dispatcher: Arc::clone(&hook_dispatcher) }) as Arc<dyn EventHandler>,
    )
    .await;
    bus.start().await;

    retention_engine
        .start_auto(Duration::from_secs(config.storage.retention.cleanup_interval_hours * 3600))
        .await;
    alert_manager
        .start_auto(Duration::from_secs(config.alerts.evaluation_interval_secs))
        .await;

    let discovery_probe = Arc::new(RuntimeProbe::new(adapters.clone()));
    discovery_probe.probe().await;

    let collection_interval = Duration::from_secs(config.global.default_collection_interval_secs.max(1));
    let collection_handle: JoinHandle<()> = tokio::spawn(collection_loop(
        Arc::clone(&collector_registry),
        Arc::clone(&store),
        Arc::clone(&discovery_probe),
        collection_interval,
    ));
    let lifecycle_poll_handle: JoinHandle<()> = tokio::spawn(lifecycle_poll_loop(
        Arc::clone(&bus),
        Arc::clone(&discovery_probe),
        collection_interval,
    ));

    info!("agentwatch running, awaiting shutdown signal");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received, draining");

    collection_handle.abort();
    lifecycle_poll_handle.abort();
    bus.stop().await;
    retention_engine.stop_auto().await;
    alert_manager.stop_auto().await;
    collector_registry.cleanup_all().await;

    info!("agentwatch stopped");
    Ok(Shutdown::Interrupted)
}

fn default_collector_configs() -> HashMap<String, CollectorConfig> {
    ["cpu", "memory", "network", "disk", "lifecycle"]
        .into_iter()
        .map(|name| {
            (
                name.to_string(),
                CollectorConfig {
                    enabled: true,
                    collector_type: name.to_string(),
                    collection_interval_secs: None,
                    timeout_secs: None,
                    retry_attempts: None,
                    retry_delay_ms: None,
                    custom_labels: HashMap::new(),
                    parameters: HashMap::new(),
                },
            )
        })
        .collect()
}

fn build_collector(collector_type: &str, probe: RuntimeProbe) -> Option<Arc<dyn Collector>> {
    match collector_type {
        "cpu" => Some(Arc::new(CpuCollector::new(probe))),
        "memory" => Some(Arc::new(MemoryCollector::new(probe))),
        "network" => Some(Arc::new(NetworkCollector::new(probe))),
        "disk" => Some(Arc::new(DiskCollector::new(probe))),
        "lifecycle" => Some(Arc::new(LifecycleCollector::new(probe))),
        _ => None,
    }
}

/// Fans every bus event into the hook dispatcher. Hooks themselves are
/// user-provided and registered against `hook_registry` out of band; this
/// binary ships none by default.
struct HookDispatchHandler {
    dispatcher: Arc<HookDispatcher>,
}

#[async_trait]
impl EventHandler for HookDispatchHandler {
    async fn handle(&self, event: &Event) -> Result<(), CoreError> {
        let results = self.dispatcher.dispatch(event.clone()).await;
        let failures = results.iter().filter(|r| !r.success).count();
        if failures > 0 {
            warn!(kind = event.kind_name(), failures, total = results.len(), "hook dispatch had failures");
        }
        Ok(())
    }
}

async fn collection_loop(
    registry: Arc<CollectorRegistry>,
    store: Arc<dyn TimeSeriesStore>,
    probe: Arc<RuntimeProbe>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let Some((_, adapter)) = probe.active().await else {
            warn!("no active runtime adapter, skipping collection tick");
            continue;
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        match adapter.list_running_container_ids().await {
            Ok(ids) => {
                for id in ids {
                    let samples = registry.collect_all(&id, now_ms).await;
                    if samples.is_empty() {
                        continue;
                    }
                    if let Err(err) = store.store(samples).await {
                        warn!(container_id = %id, error = %err, "failed to persist collected samples");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to enumerate running containers"),
        }
    }
}

#[derive(Deserialize)]
struct DockerEventLine {
    status: String,
    id: String,
    #[serde(rename = "Actor")]
    actor: DockerEventActor,
    time: i64,
}

#[derive(Deserialize)]
struct DockerEventActor {
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

fn parse_lifecycle_action(status: &str) -> Option<LifecycleAction> {
    match status {
        "create" => Some(LifecycleAction::Create),
        "start" => Some(LifecycleAction::Start),
        "stop" => Some(LifecycleAction::Stop),
        "restart" => Some(LifecycleAction::Restart),
        "die" => Some(LifecycleAction::Die),
        "kill" => Some(LifecycleAction::Kill),
        "pause" => Some(LifecycleAction::Pause),
        "unpause" => Some(LifecycleAction::Unpause),
        "destroy" => Some(LifecycleAction::Destroy),
        s if s.starts_with("health_status") => Some(LifecycleAction::HealthStatus),
        _ => None,
    }
}

/// Polls `docker events` on a timer and republishes terminal container
/// transitions as `Lifecycle` events (§6 runtime adapter contract).
async fn lifecycle_poll_loop(bus: Arc<EventBus>, probe: Arc<RuntimeProbe>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let since_secs = interval.as_secs().max(1);
    loop {
        ticker.tick().await;
        let Some((_, adapter)) = probe.active().await else {
            continue;
        };
        let lines = match adapter.recent_events(since_secs).await {
            Ok(lines) => lines,
            Err(err) => {
                warn!(error = %err, "failed to poll runtime events");
                continue;
            }
        };
        for line in lines {
            let parsed: DockerEventLine = match serde_json::from_str(&line) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(error = %err, "failed to parse runtime event line");
                    continue;
                }
            };
            let Some(action) = parse_lifecycle_action(&parsed.status) else {
                continue;
            };
            let timestamp_ms = parsed.time * 1000;
            let event = Event::new(
                uuid::Uuid::new_v4().to_string(),
                timestamp_ms,
                "runtime",
                EventSeverity::Info,
                EventPayload::Lifecycle(LifecycleEvent {
                    container_id: parsed.id,
                    container_name: parsed.actor.attributes.get("name").cloned().unwrap_or_default(),
                    image: parsed.actor.attributes.get("image").cloned().unwrap_or_default(),
                    action,
                    timestamp_ms,
                    exit_code: None,
                    signal: None,
                }),
            );
            if let Err(err) = bus.publish(event).await {
                warn!(error = %err, "dropping lifecycle event, bus queue full");
            }
        }
    }
}

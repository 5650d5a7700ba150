//! End-to-end metrics pipeline: a collector's samples land in the store,
//! survive a retention sweep, and an alert rule evaluated against the store
//! fires a notification through a routed channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agentwatch::domain::errors::CoreError;
use agentwatch::domain::models::alert::{AlertCondition, AlertRule};
use agentwatch::domain::models::event::{Comparator, EventSeverity};
use agentwatch::domain::models::retention::RetentionRule;
use agentwatch::infrastructure::runtime_adapter::{ContainerInspect, ContainerStats, RuntimeAdapter};
use agentwatch::services::{
    AlertManager, CollectorRegistry, CpuCollector, InMemoryStore, LogChannel, NotificationRouter,
    RetentionEngine, RuntimeProbe, TimeSeriesStore,
};
use async_trait::async_trait;
use chrono::DateTime;

struct StubAdapter;

#[async_trait]
impl RuntimeAdapter for StubAdapter {
    async fn version(&self) -> Result<String, CoreError> {
        Ok("stub/1.0".to_string())
    }
    async fn stats(&self, _id: &str) -> Result<ContainerStats, CoreError> {
        Ok(ContainerStats {
            cpu_percent_raw: Some("91.20%".to_string()),
            mem_usage_raw: None,
            net_io_raw: None,
            block_io_raw: None,
        })
    }
    async fn inspect(&self, _id: &str) -> Result<ContainerInspect, CoreError> {
        unimplemented!()
    }
    async fn restart(&self, _id: &str) -> Result<(), CoreError> {
        Ok(())
    }
    async fn stop(&self, _id: &str) -> Result<(), CoreError> {
        Ok(())
    }
    async fn start(&self, _id: &str) -> Result<(), CoreError> {
        Ok(())
    }
    async fn update(&self, _id: &str, _cpus: Option<f64>, _mem: Option<i64>) -> Result<(), CoreError> {
        Ok(())
    }
    async fn recent_events(&self, _since_secs: u64) -> Result<Vec<String>, CoreError> {
        Ok(Vec::new())
    }
    async fn list_running_container_ids(&self) -> Result<Vec<String>, CoreError> {
        Ok(vec!["c1".to_string()])
    }
}

fn high_cpu_rule() -> AlertRule {
    let mut rule = AlertRule::new("high-cpu", "cpu too hot", EventSeverity::High);
    rule.conditions.push(AlertCondition {
        metric_name: "container_cpu_percent".to_string(),
        comparator: Comparator::Gt,
        threshold: 80.0,
        label_filters: HashMap::new(),
        evaluation_window_secs: None,
        min_sample_count: 1,
    });
    rule.for_duration = None;
    rule.throttle_duration = None;
    rule
}

#[tokio::test]
async fn collected_samples_flow_through_store_retention_and_alerting() {
    let adapter: Arc<dyn RuntimeAdapter> = Arc::new(StubAdapter);
    let probe = RuntimeProbe::new(vec![("docker".to_string(), adapter)]);
    let registry = CollectorRegistry::new(vec![Arc::new(CpuCollector::new(probe))]);
    registry.initialize_all().await;

    let now = DateTime::from_timestamp(10_000, 0).unwrap();
    let now_ms = now.timestamp_millis();
    let samples = registry.collect_all("c1", now_ms).await;
    assert_eq!(samples.len(), 1);

    let store: Arc<dyn TimeSeriesStore> = Arc::new(InMemoryStore::default());
    store.store(samples).await.unwrap();

    let retention = Arc::new(RetentionEngine::new(Arc::clone(&store), Duration::from_secs(7 * 24 * 3600)));
    retention.add_rule(RetentionRule::new("container_cpu_percent", Duration::from_secs(3600), 10)).await;
    let report = retention.apply(now_ms, false).await;
    assert_eq!(report.deleted_count, 0, "a fresh sample must survive an immediate sweep");

    let mut router = NotificationRouter::new(1, Duration::from_millis(1));
    router.add_template("default", "{{message}}");
    router.register_channel(Box::new(LogChannel::new("log")));

    let manager = Arc::new(AlertManager::new(store, Arc::new(router), 10, Duration::from_secs(600)));
    manager.add_rule(high_cpu_rule()).await;
    manager.evaluate_once(now).await;

    let active = manager.active_alerts().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].rule_id, "high-cpu");
}

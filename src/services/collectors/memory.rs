//! Memory collector (C4, §4.4): usage, limit, and percentage from Docker's
//! `MemUsage` field (`"<used> / <limit>"`).

use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{parse_byte_pair, RuntimeProbe};
use crate::domain::errors::CoreError;
use crate::domain::models::collector::{Collector, CollectorStatus};
use crate::domain::models::sample::{MetricSample, SampleValue};

pub struct MemoryCollector {
    probe: RuntimeProbe,
    status: Mutex<CollectorStatus>,
}

impl MemoryCollector {
    pub fn new(probe: RuntimeProbe) -> Self {
        Self { probe, status: Mutex::new(CollectorStatus::default()) }
    }
}

#[async_trait]
impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn initialize(&self) -> bool {
        self.probe.probe().await
    }

    async fn cleanup(&self) {}

    fn metric_types(&self) -> Vec<String> {
        vec![
            "container_memory_usage_bytes".to_string(),
            "container_memory_limit_bytes".to_string(),
            "container_memory_percent".to_string(),
        ]
    }

    async fn collect(&self, target: &str) -> Result<Vec<MetricSample>, CoreError> {
        let Some((runtime_name, adapter)) = self.probe.active().await else {
            return Err(CoreError::Dependency("no runtime adapter available".to_string()));
        };
        let stats = adapter.stats(target).await?;
        let Some(raw) = stats.mem_usage_raw else {
            return Ok(Vec::new());
        };
        let Some((used, limit)) = parse_byte_pair(&raw) else {
            return Ok(Vec::new());
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        let percent = if limit > 0.0 { used / limit * 100.0 } else { 0.0 };

        let labeled = |name: &str, value: f64| {
            MetricSample::new(name, SampleValue::Number(value), now_ms)
                .with_label("container_id", target)
                .with_label("runtime", runtime_name.clone())
        };
        Ok(vec![
            labeled("container_memory_usage_bytes", used),
            labeled("container_memory_limit_bytes", limit),
            labeled("container_memory_percent", percent),
        ])
    }

    fn status_cell(&self) -> &Mutex<CollectorStatus> {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::runtime_adapter::{ContainerInspect, ContainerStats, RuntimeAdapter};
    use std::sync::Arc;

    struct StubAdapter;

    #[async_trait]
    impl RuntimeAdapter for StubAdapter {
        async fn version(&self) -> Result<String, CoreError> {
            Ok("stub/1.0".to_string())
        }
        async fn stats(&self, _id: &str) -> Result<ContainerStats, CoreError> {
            Ok(ContainerStats {
                cpu_percent_raw: None,
                mem_usage_raw: Some("100MiB / 1GiB".to_string()),
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

    #[tokio::test]
    async fn collect_derives_percent_from_usage_and_limit() {
        let adapter: std::sync::Arc<dyn RuntimeAdapter> = Arc::new(StubAdapter);
        let probe = RuntimeProbe::new(vec![("docker".to_string(), adapter)]);
        let collector = MemoryCollector::new(probe);
        collector.initialize().await;

        let samples = collector.collect_with_error_handling("c1", 0).await;
        assert_eq!(samples.len(), 3);
        let percent = samples.iter().find(|s| s.name == "container_memory_percent").unwrap();
        assert!(matches!(percent.value, SampleValue::Number(v) if (v - 9.765625).abs() < 0.01));
    }
}

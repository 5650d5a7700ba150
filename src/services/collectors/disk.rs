//! Disk I/O collector (C4, §4.4): read/write bytes from Docker's `BlockIO` field.

use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{parse_byte_pair, RuntimeProbe};
use crate::domain::errors::CoreError;
use crate::domain::models::collector::{Collector, CollectorStatus};
use crate::domain::models::sample::{MetricSample, SampleValue};

pub struct DiskCollector {
    probe: RuntimeProbe,
    status: Mutex<CollectorStatus>,
}

impl DiskCollector {
    pub fn new(probe: RuntimeProbe) -> Self {
        Self { probe, status: Mutex::new(CollectorStatus::default()) }
    }
}

#[async_trait]
impl Collector for DiskCollector {
    fn name(&self) -> &str {
        "disk"
    }

    async fn initialize(&self) -> bool {
        self.probe.probe().await
    }

    async fn cleanup(&self) {}

    fn metric_types(&self) -> Vec<String> {
        vec!["container_disk_read_bytes".to_string(), "container_disk_write_bytes".to_string()]
    }

    async fn collect(&self, target: &str) -> Result<Vec<MetricSample>, CoreError> {
        let Some((runtime_name, adapter)) = self.probe.active().await else {
            return Err(CoreError::Dependency("no runtime adapter available".to_string()));
        };
        let stats = adapter.stats(target).await?;
        let Some(raw) = stats.block_io_raw else {
            return Ok(Vec::new());
        };
        let Some((read, write)) = parse_byte_pair(&raw) else {
            return Ok(Vec::new());
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        let labeled = |name: &str, value: f64| {
            MetricSample::new(name, SampleValue::Number(value), now_ms)
                .with_label("container_id", target)
                .with_label("runtime", runtime_name.clone())
        };
        Ok(vec![labeled("container_disk_read_bytes", read), labeled("container_disk_write_bytes", write)])
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
                mem_usage_raw: None,
                net_io_raw: None,
                block_io_raw: Some("4.2MB / 0B".to_string()),
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
    async fn collect_splits_read_and_write() {
        let adapter: std::sync::Arc<dyn RuntimeAdapter> = Arc::new(StubAdapter);
        let probe = RuntimeProbe::new(vec![("docker".to_string(), adapter)]);
        let collector = DiskCollector::new(probe);
        collector.initialize().await;
        let samples = collector.collect_with_error_handling("c1", 0).await;
        assert_eq!(samples.len(), 2);
        assert!(matches!(samples[0].value, SampleValue::Number(v) if (v - 4_200_000.0).abs() < 1.0));
        assert!(matches!(samples[1].value, SampleValue::Number(v) if v == 0.0));
    }
}

//! CPU collector (C4, §4.4).
//!
//! Docker's own `stats --format json` already reduces the raw
//! `cpu_stats`/`precpu_stats` counters the engine API exposes into a
//! percentage string (`CPUPerc`); a CLI-shelling adapter never sees the raw
//! deltas, so this collector parses that pre-computed percentage rather than
//! re-deriving `Δtotal_usage / Δsystem_usage × n_cpus × 100` itself. See
//! `DESIGN.md` for the tradeoff.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::traits::{parse_percent, RuntimeProbe};
use crate::domain::errors::CoreError;
use crate::domain::models::collector::{Collector, CollectorStatus};
use crate::domain::models::sample::{MetricSample, SampleValue};

pub struct CpuCollector {
    probe: RuntimeProbe,
    status: Mutex<CollectorStatus>,
}

impl CpuCollector {
    pub fn new(probe: RuntimeProbe) -> Self {
        Self { probe, status: Mutex::new(CollectorStatus::default()) }
    }
}

#[async_trait]
impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    async fn initialize(&self) -> bool {
        self.probe.probe().await
    }

    async fn cleanup(&self) {}

    fn metric_types(&self) -> Vec<String> {
        vec!["container_cpu_percent".to_string()]
    }

    async fn collect(&self, target: &str) -> Result<Vec<MetricSample>, CoreError> {
        let Some((runtime_name, adapter)) = self.probe.active().await else {
            return Err(CoreError::Dependency("no runtime adapter available".to_string()));
        };
        let stats = adapter.stats(target).await?;
        let Some(raw) = stats.cpu_percent_raw else {
            return Ok(Vec::new());
        };
        let percent = parse_percent(&raw).unwrap_or(0.0).max(0.0);

        let sample = MetricSample::new(
            "container_cpu_percent",
            SampleValue::Number(percent),
            chrono::Utc::now().timestamp_millis(),
        )
        .with_label("container_id", target)
        .with_label("runtime", runtime_name);
        Ok(vec![sample])
    }

    fn status_cell(&self) -> &Mutex<CollectorStatus> {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::runtime_adapter::{ContainerInspect, ContainerStats, RuntimeAdapter};

    struct StubAdapter {
        cpu_percent_raw: Option<String>,
    }

    #[async_trait]
    impl RuntimeAdapter for StubAdapter {
        async fn version(&self) -> Result<String, CoreError> {
            Ok("stub/1.0".to_string())
        }
        async fn stats(&self, _id: &str) -> Result<ContainerStats, CoreError> {
            Ok(ContainerStats {
                cpu_percent_raw: self.cpu_percent_raw.clone(),
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

    #[tokio::test]
    async fn collect_parses_percent_and_labels_runtime() {
        let adapter: Arc<dyn RuntimeAdapter> = Arc::new(StubAdapter { cpu_percent_raw: Some("12.34%".to_string()) });
        let probe = RuntimeProbe::new(vec![("docker".to_string(), adapter)]);
        let collector = CpuCollector::new(probe);
        assert!(collector.initialize().await);

        let samples = collector.collect_with_error_handling("c1", 0).await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, SampleValue::Number(12.34));
        assert_eq!(samples[0].labels.get("runtime"), Some(&"docker".to_string()));
        assert!(collector.status().healthy);
    }

    #[tokio::test]
    async fn failed_probe_leaves_collector_unhealthy_after_five_errors() {
        let probe = RuntimeProbe::new(Vec::new());
        let collector = CpuCollector::new(probe);
        assert!(!collector.initialize().await);

        for _ in 0..5 {
            collector.collect_with_error_handling("c1", 0).await;
        }
        assert!(!collector.status().healthy);
    }
}

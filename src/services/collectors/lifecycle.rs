//! Lifecycle collector (C4, §4.4): uptime, restart count, numeric status, and
//! exit code derived from `inspect`'s `State` subtree.
//!
//! Grounded on the original lifecycle collector's reading of
//! `State.StartedAt`/`State.RestartCount`/`State.ExitCode`.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;

use super::traits::RuntimeProbe;
use crate::domain::errors::CoreError;
use crate::domain::models::collector::{Collector, CollectorStatus};
use crate::domain::models::sample::{MetricSample, SampleValue};

pub struct LifecycleCollector {
    probe: RuntimeProbe,
    status: Mutex<CollectorStatus>,
}

impl LifecycleCollector {
    pub fn new(probe: RuntimeProbe) -> Self {
        Self { probe, status: Mutex::new(CollectorStatus::default()) }
    }
}

#[async_trait]
impl Collector for LifecycleCollector {
    fn name(&self) -> &str {
        "lifecycle"
    }

    async fn initialize(&self) -> bool {
        self.probe.probe().await
    }

    async fn cleanup(&self) {}

    fn metric_types(&self) -> Vec<String> {
        vec![
            "container_uptime_seconds".to_string(),
            "container_restart_count".to_string(),
            "container_running".to_string(),
            "container_exit_code".to_string(),
        ]
    }

    async fn collect(&self, target: &str) -> Result<Vec<MetricSample>, CoreError> {
        let Some((runtime_name, adapter)) = self.probe.active().await else {
            return Err(CoreError::Dependency("no runtime adapter available".to_string()));
        };
        let inspect = adapter.inspect(target).await?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let running = inspect.state.health.as_ref().map(|h| h.status == "healthy").unwrap_or(inspect.state.exit_code == 0);

        let uptime_seconds = DateTime::parse_from_rfc3339(&inspect.state.started_at)
            .map(|started| (chrono::Utc::now().timestamp() - started.timestamp()).max(0) as f64)
            .unwrap_or(0.0);

        let labeled = |name: &str, value: f64| {
            MetricSample::new(name, SampleValue::Number(value), now_ms)
                .with_label("container_id", target)
                .with_label("runtime", runtime_name.clone())
        };

        let mut samples = vec![
            labeled("container_uptime_seconds", uptime_seconds),
            labeled("container_restart_count", inspect.state.restart_count as f64),
            labeled("container_running", if running { 1.0 } else { 0.0 }),
        ];
        if !running {
            samples.push(labeled("container_exit_code", inspect.state.exit_code as f64));
        }
        Ok(samples)
    }

    fn status_cell(&self) -> &Mutex<CollectorStatus> {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::runtime_adapter::{
        ContainerHostConfig, ContainerInspect, ContainerInspectState, ContainerStats, RuntimeAdapter,
    };
    use std::sync::Arc;

    struct StubAdapter {
        exit_code: i32,
        restart_count: u32,
    }

    #[async_trait]
    impl RuntimeAdapter for StubAdapter {
        async fn version(&self) -> Result<String, CoreError> {
            Ok("stub/1.0".to_string())
        }
        async fn stats(&self, _id: &str) -> Result<ContainerStats, CoreError> {
            unimplemented!()
        }
        async fn inspect(&self, _id: &str) -> Result<ContainerInspect, CoreError> {
            Ok(ContainerInspect {
                id: "c1".to_string(),
                name: "/app".to_string(),
                state: ContainerInspectState {
                    started_at: "2024-01-01T00:00:00Z".to_string(),
                    restart_count: self.restart_count,
                    exit_code: self.exit_code,
                    health: None,
                },
                host_config: ContainerHostConfig::default(),
            })
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
    async fn terminal_container_emits_exit_code() {
        let adapter: std::sync::Arc<dyn RuntimeAdapter> = Arc::new(StubAdapter { exit_code: 137, restart_count: 2 });
        let probe = RuntimeProbe::new(vec![("docker".to_string(), adapter)]);
        let collector = LifecycleCollector::new(probe);
        collector.initialize().await;
        let samples = collector.collect_with_error_handling("c1", 0).await;

        assert!(samples.iter().any(|s| s.name == "container_exit_code" && s.value == SampleValue::Number(137.0)));
        assert!(samples.iter().any(|s| s.name == "container_restart_count" && s.value == SampleValue::Number(2.0)));
        assert!(samples.iter().any(|s| s.name == "container_running" && s.value == SampleValue::Number(0.0)));
    }

    #[tokio::test]
    async fn running_container_has_no_exit_code_sample() {
        let adapter: std::sync::Arc<dyn RuntimeAdapter> = Arc::new(StubAdapter { exit_code: 0, restart_count: 0 });
        let probe = RuntimeProbe::new(vec![("docker".to_string(), adapter)]);
        let collector = LifecycleCollector::new(probe);
        collector.initialize().await;
        let samples = collector.collect_with_error_handling("c1", 0).await;

        assert!(!samples.iter().any(|s| s.name == "container_exit_code"));
        assert!(samples.iter().any(|s| s.name == "container_running" && s.value == SampleValue::Number(1.0)));
    }
}

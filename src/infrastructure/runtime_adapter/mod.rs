//! Container runtime adapter (§6 "External interfaces").
//!
//! Shells out to a container runtime CLI (`docker`/`podman`-compatible) the
//! same way the substrate layer shells out to the `claude` CLI: a thin
//! `tokio::process::Command` wrapper with a cooperative timeout, parsing JSON
//! stdout into typed structs. No client library is linked; the sub-process
//! boundary is the integration point.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use crate::domain::errors::CoreError;

/// Point-in-time resource usage for one container (§6 stats contract).
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerStats {
    #[serde(rename = "CPUPerc")]
    pub cpu_percent_raw: Option<String>,
    #[serde(rename = "MemUsage")]
    pub mem_usage_raw: Option<String>,
    #[serde(rename = "NetIO")]
    pub net_io_raw: Option<String>,
    #[serde(rename = "BlockIO")]
    pub block_io_raw: Option<String>,
}

/// Subset of `inspect` fields the platform consumes (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInspect {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "State")]
    pub state: ContainerInspectState,
    #[serde(rename = "HostConfig")]
    pub host_config: ContainerHostConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInspectState {
    #[serde(rename = "StartedAt")]
    pub started_at: String,
    #[serde(rename = "RestartCount")]
    pub restart_count: u32,
    #[serde(rename = "ExitCode")]
    pub exit_code: i32,
    #[serde(rename = "Health")]
    pub health: Option<ContainerHealth>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerHealth {
    #[serde(rename = "Status")]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerHostConfig {
    #[serde(rename = "NanoCpus")]
    pub nano_cpus: Option<i64>,
    #[serde(rename = "CpuQuota")]
    pub cpu_quota: Option<i64>,
    #[serde(rename = "CpuPeriod")]
    pub cpu_period: Option<i64>,
    #[serde(rename = "Memory")]
    pub memory: Option<i64>,
}

/// Capability interface over a container runtime's CLI (§6). Implementations
/// shell out; the platform core never links a runtime client library.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    async fn version(&self) -> Result<String, CoreError>;
    async fn stats(&self, container_id: &str) -> Result<ContainerStats, CoreError>;
    async fn inspect(&self, container_id: &str) -> Result<ContainerInspect, CoreError>;
    async fn restart(&self, container_id: &str) -> Result<(), CoreError>;
    async fn stop(&self, container_id: &str) -> Result<(), CoreError>;
    async fn start(&self, container_id: &str) -> Result<(), CoreError>;
    async fn update(&self, container_id: &str, cpus: Option<f64>, memory_bytes: Option<i64>)
        -> Result<(), CoreError>;
    /// Raw `events --format json --filter type=container` lines, one event per line.
    async fn recent_events(&self, since_secs: u64) -> Result<Vec<String>, CoreError>;
    /// Ids of currently-running containers, driving the collection loop's
    /// per-target fan-out.
    async fn list_running_container_ids(&self) -> Result<Vec<String>, CoreError>;
}

/// Adapter over a CLI binary compatible with the Docker/Podman command
/// surface named in §6 (`version`, `stats --no-stream`, `inspect`, ...).
pub struct CliRuntimeAdapter {
    binary: String,
    timeout: Duration,
}

impl CliRuntimeAdapter {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn docker(timeout: Duration) -> Self {
        Self::new("docker", timeout)
    }

    async fn run(&self, args: &[&str]) -> Result<String, CoreError> {
        let output = timeout(
            self.timeout,
            Command::new(&self.binary)
                .args(args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| CoreError::Timeout(self.timeout.as_millis() as u64))?
        .map_err(|e| CoreError::Dependency(format!("{} spawn failed: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Dependency(format!(
                "{} {:?} failed: {stderr}",
                self.binary, args
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| CoreError::Unknown(format!("non-utf8 output from {}: {e}", self.binary)))
    }
}

#[async_trait]
impl RuntimeAdapter for CliRuntimeAdapter {
    async fn version(&self) -> Result<String, CoreError> {
        self.run(&["version", "--format", "{{.Server.Version}}"])
            .await
            .map(|s| s.trim().to_string())
    }

    async fn stats(&self, container_id: &str) -> Result<ContainerStats, CoreError> {
        let raw = self
            .run(&["stats", "--no-stream", "--format", "json", container_id])
            .await?;
        serde_json::from_str(raw.trim()).map_err(CoreError::from)
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerInspect, CoreError> {
        let raw = self.run(&["inspect", container_id]).await?;
        let mut parsed: Vec<ContainerInspect> =
            serde_json::from_str(&raw).map_err(CoreError::from)?;
        parsed
            .pop()
            .ok_or_else(|| CoreError::Dependency(format!("no inspect result for {container_id}")))
    }

    async fn restart(&self, container_id: &str) -> Result<(), CoreError> {
        self.run(&["restart", container_id]).await.map(|_| ())
    }

    async fn stop(&self, container_id: &str) -> Result<(), CoreError> {
        self.run(&["stop", container_id]).await.map(|_| ())
    }

    async fn start(&self, container_id: &str) -> Result<(), CoreError> {
        self.run(&["start", container_id]).await.map(|_| ())
    }

    async fn update(
        &self,
        container_id: &str,
        cpus: Option<f64>,
        memory_bytes: Option<i64>,
    ) -> Result<(), CoreError> {
        let mut args = vec!["update".to_string()];
        if let Some(cpus) = cpus {
            args.push("--cpus".to_string());
            args.push(cpus.to_string());
        }
        if let Some(memory) = memory_bytes {
            args.push("--memory".to_string());
            args.push(memory.to_string());
        }
        args.push(container_id.to_string());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await.map(|_| ())
    }

    async fn recent_events(&self, since_secs: u64) -> Result<Vec<String>, CoreError> {
        let since = format!("{since_secs}s");
        let mut child = Command::new(&self.binary)
            .args([
                "events",
                "--since",
                &since,
                "--until",
                "0s",
                "--format",
                "json",
                "--filter",
                "type=container",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::Dependency(format!("{} spawn failed: {e}", self.binary)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::Dependency("no stdout pipe".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut events = Vec::new();
        loop {
            match timeout(self.timeout, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if !line.trim().is_empty() {
                        events.push(line);
                    }
                }
                _ => break,
            }
        }
        let _ = child.start_kill();
        Ok(events)
    }

    async fn list_running_container_ids(&self) -> Result<Vec<String>, CoreError> {
        let raw = self.run(&["ps", "-q", "--no-trunc"]).await?;
        Ok(raw.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_state_decodes_health_status() {
        let json = r#"{"Status":"healthy"}"#;
        let health: ContainerHealth = serde_json::from_str(json).unwrap();
        assert_eq!(health.status, "healthy");
    }

    #[test]
    fn host_config_defaults_when_fields_absent() {
        let host_config: ContainerHostConfig = serde_json::from_str("{}").unwrap();
        assert!(host_config.nano_cpus.is_none());
        assert!(host_config.memory.is_none());
    }
}

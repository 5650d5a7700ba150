//! Shared helpers for the reference collectors: runtime probing (§4.4) and
//! parsing of the `docker stats`-style human-readable size/ratio strings the
//! CLI adapter returns.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::infrastructure::runtime_adapter::RuntimeAdapter;

/// Probes a preferred runtime adapter, falling back to the next candidate on
/// failure, and remembers which one answered (§4.4 "Runtime probing").
pub struct RuntimeProbe {
    candidates: Vec<(String, Arc<dyn RuntimeAdapter>)>,
    active: RwLock<Option<(String, Arc<dyn RuntimeAdapter>)>>,
}

impl RuntimeProbe {
    pub fn new(candidates: Vec<(String, Arc<dyn RuntimeAdapter>)>) -> Self {
        Self { candidates, active: RwLock::new(None) }
    }

    /// Tries each candidate's `version()` in order; the first to answer
    /// becomes the active adapter. Returns whether any candidate succeeded.
    pub async fn probe(&self) -> bool {
        for (name, adapter) in &self.candidates {
            match adapter.version().await {
                Ok(_) => {
                    *self.active.write().await = Some((name.clone(), Arc::clone(adapter)));
                    return true;
                }
                Err(err) => {
                    warn!(runtime = %name, error = %err, "runtime probe failed, trying next candidate");
                }
            }
        }
        *self.active.write().await = None;
        false
    }

    /// The currently active adapter and its label, if probing succeeded.
    pub async fn active(&self) -> Option<(String, Arc<dyn RuntimeAdapter>)> {
        self.active.read().await.clone()
    }
}

/// Parses a Docker-style byte size such as `12.5MiB` or `648B` into bytes.
pub fn parse_byte_size(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let split_at = raw.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let (number, unit) = raw.split_at(split_at);
    let number: f64 = number.parse().ok()?;
    let multiplier = match unit.trim() {
        "B" => 1.0,
        "kB" | "KB" => 1_000.0,
        "KiB" => 1024.0,
        "MB" => 1_000_000.0,
        "MiB" => 1024.0 * 1024.0,
        "GB" => 1_000_000_000.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TB" => 1_000_000_000_000.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some(number * multiplier)
}

/// Parses a `"<used> / <limit>"` pair such as Docker's `MemUsage`/`NetIO`/`BlockIO`.
pub fn parse_byte_pair(raw: &str) -> Option<(f64, f64)> {
    let (left, right) = raw.split_once('/')?;
    Some((parse_byte_size(left)?, parse_byte_size(right)?))
}

/// Parses a Docker `CPUPerc`-style percentage string such as `"12.34%"`.
pub fn parse_percent(raw: &str) -> Option<f64> {
    raw.trim().trim_end_matches('%').parse().ok()
}

//! Metrics collector model (C4, §4.4): the capability interface every
//! collector implements, plus the shared status bookkeeping every
//! implementation folds its outcomes into.

use std::sync::Mutex;

use async_trait::async_trait;

use super::sample::MetricSample;
use crate::domain::errors::CoreError;

/// Running tally of a collector's health (§4.4 "Error discipline").
#[derive(Debug, Clone)]
pub struct CollectorStatus {
    pub success_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub healthy: bool,
    pub last_timestamp_ms: Option<i64>,
    consecutive_errors: u32,
}

impl Default for CollectorStatus {
    fn default() -> Self {
        Self {
            success_count: 0,
            error_count: 0,
            last_error: None,
            healthy: true,
            last_timestamp_ms: None,
            consecutive_errors: 0,
        }
    }
}

impl CollectorStatus {
    fn record_success(&mut self, timestamp_ms: i64) {
        self.success_count += 1;
        self.consecutive_errors = 0;
        self.healthy = true;
        self.last_timestamp_ms = Some(timestamp_ms);
    }

    /// Flips to unhealthy after five consecutive errors (§4.4); a later
    /// success resets the streak and flips it back.
    fn record_error(&mut self, error: String) {
        self.error_count += 1;
        self.consecutive_errors += 1;
        self.last_error = Some(error);
        if self.consecutive_errors >= 5 {
            self.healthy = false;
        }
    }
}

/// Capability interface a concrete collector (CPU, memory, network, disk,
/// lifecycle, ...) implements. Not a class hierarchy: each implementation is
/// a concrete record, the way `Hook` and `NotificationChannel` are.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;
    /// Probes the runtime (preferred, then fallback) and readies the
    /// collector. `false` means the collector should be left out of
    /// subsequent `collect_all` calls.
    async fn initialize(&self) -> bool;
    async fn cleanup(&self);
    fn metric_types(&self) -> Vec<String>;
    fn enabled(&self) -> bool {
        true
    }
    /// One reading for `target`. Implementations propagate their own errors;
    /// `collect_with_error_handling` is what the registry actually calls.
    async fn collect(&self, target: &str) -> Result<Vec<MetricSample>, CoreError>;

    /// The `Mutex` every implementation carries so the default methods below
    /// can apply the shared error-counting rule without each collector
    /// re-deriving it.
    fn status_cell(&self) -> &Mutex<CollectorStatus>;

    fn status(&self) -> CollectorStatus {
        self.status_cell().lock().unwrap().clone()
    }

    /// Common wrapper (§4.4): never propagates, always updates `status()`.
    async fn collect_with_error_handling(&self, target: &str, now_ms: i64) -> Vec<MetricSample> {
        match self.collect(target).await {
            Ok(samples) => {
                self.status_cell().lock().unwrap().record_success(now_ms);
                samples
            }
            Err(err) => {
                self.status_cell().lock().unwrap().record_error(err.to_string());
                Vec::new()
            }
        }
    }
}

//! Collector registry (C4, §4.4 "Registry (CollectorRegistry)"): owns the
//! full set of collectors and fans a single `collect_all` call out across
//! whichever ones are enabled and healthy.
//!
//! Grounded on the overseer cluster's phased fan-out with per-item error
//! isolation, simplified to one unphased concurrent pass: collectors here
//! have no cost tiers or blocking-failure propagation the way overseers do.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::models::collector::{Collector, CollectorStatus};
use crate::domain::models::sample::MetricSample;

struct Entry {
    collector: Arc<dyn Collector>,
    ready: bool,
}

pub struct CollectorRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl CollectorRegistry {
    pub fn new(collectors: Vec<Arc<dyn Collector>>) -> Self {
        let entries = collectors.into_iter().map(|collector| Entry { collector, ready: false }).collect();
        Self { entries: RwLock::new(entries) }
    }

    /// Initializes every registered collector, recording which ones came up.
    /// A collector that fails to initialize is excluded from `collect_all`
    /// until the registry is re-initialized.
    pub async fn initialize_all(&self) {
        let mut entries = self.entries.write().await;
        for entry in entries.iter_mut() {
            entry.ready = entry.collector.initialize().await;
            if entry.ready {
                info!(collector = entry.collector.name(), "collector initialized");
            } else {
                warn!(collector = entry.collector.name(), "collector failed to initialize, excluding from collection");
            }
        }
    }

    pub async fn cleanup_all(&self) {
        let entries = self.entries.read().await;
        for entry in entries.iter() {
            entry.collector.cleanup().await;
        }
    }

    /// Runs every ready, enabled, and healthy collector against `target`
    /// concurrently and flattens their samples. A single collector's failure
    /// is isolated by `collect_with_error_handling` and never aborts the rest.
    pub async fn collect_all(&self, target: &str, now_ms: i64) -> Vec<MetricSample> {
        let entries = self.entries.read().await;
        let futures = entries
            .iter()
            .filter(|entry| entry.ready && entry.collector.enabled() && entry.collector.status().healthy)
            .map(|entry| {
                let collector = Arc::clone(&entry.collector);
                async move { collector.collect_with_error_handling(target, now_ms).await }
            });
        futures::future::join_all(futures).await.into_iter().flatten().collect()
    }

    pub async fn statuses(&self) -> Vec<(String, CollectorStatus)> {
        let entries = self.entries.read().await;
        entries.iter().map(|entry| (entry.collector.name().to_string(), entry.collector.status())).collect()
    }
}

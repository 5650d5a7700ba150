//! Retention engine (C3, §4.6): rule-driven cleanup of the time-series store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::models::retention::RetentionRule;
use crate::services::timeseries_store::TimeSeriesStore;

/// Outcome of one sweep, dry-run or real (§4.6).
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub deleted_count: usize,
    pub by_metric: HashMap<String, usize>,
    pub by_rule: HashMap<String, usize>,
    pub errors: Vec<String>,
}

struct State {
    /// Priority-descending; same-priority ties broken toward the longest
    /// literal pattern prefix (§11 of the expanded spec).
    rules: Vec<RetentionRule>,
    default_retention: Duration,
}

impl State {
    fn sort_rules(&mut self) {
        self.rules
            .sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| b.specificity().cmp(&a.specificity())));
    }

    /// First rule whose pattern matches the name and whose label filters are
    /// a subset of `labels`; `None` means the configured default applies.
    fn matching_rule(&self, name: &str, labels: &HashMap<String, String>) -> Option<&RetentionRule> {
        self.rules.iter().find(|rule| rule.matches_name(name) && rule.matches_labels(labels))
    }
}

/// Owns the retention rule set and sweeps the time-series store on a timer or
/// on demand (§4.6). Rule selection and the per-series floor are grounded on
/// the store's own `delete_series_keeping_minimum`.
pub struct RetentionEngine {
    store: Arc<dyn TimeSeriesStore>,
    state: RwLock<State>,
    auto_task: Mutex<Option<JoinHandle<()>>>,
}

impl RetentionEngine {
    pub fn new(store: Arc<dyn TimeSeriesStore>, default_retention: Duration) -> Self {
        Self {
            store,
            state: RwLock::new(State { rules: Vec::new(), default_retention }),
            auto_task: Mutex::new(None),
        }
    }

    pub async fn add_rule(&self, rule: RetentionRule) {
        let mut state = self.state.write().await;
        state.rules.retain(|existing| existing.pattern != rule.pattern);
        state.rules.push(rule);
        state.sort_rules();
    }

    pub async fn remove_rule(&self, pattern: &str) {
        let mut state = self.state.write().await;
        state.rules.retain(|rule| rule.pattern != pattern);
    }

    pub async fn rules(&self) -> Vec<RetentionRule> {
        self.state.read().await.rules.clone()
    }

    /// The retention duration that would apply to a sample with this name and
    /// labels: first matching rule, else the configured default.
    pub async fn retention_for(&self, name: &str, labels: &HashMap<String, String>) -> Duration {
        let state = self.state.read().await;
        state.matching_rule(name, labels).map_or(state.default_retention, |rule| rule.retention)
    }

    /// Sweeps every known series: for each, determines its retention rule (or
    /// the default), deletes points older than `now - retention` while
    /// preserving the rule's `min_points_to_keep` floor. `dry_run` computes
    /// the report without mutating the store.
    pub async fn apply(&self, now_ms: i64, dry_run: bool) -> ApplyReport {
        let state = self.state.read().await;
        let mut report = ApplyReport::default();

        let names = self.store.metric_names().await;
        for name in &names {
            let fingerprints = self.store.fingerprints_matching(name).await;
            for fingerprint in fingerprints {
                let rule = state.matching_rule(&fingerprint.name, &fingerprint.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
                let (retention, min_points_to_keep, rule_key) = match rule {
                    Some(rule) => (rule.retention, rule.min_points_to_keep, rule.pattern.clone()),
                    None => (state.default_retention, 0, "default".to_string()),
                };
                let cutoff_ms = now_ms - retention.as_millis() as i64;

                let deleted = if dry_run {
                    self.count_deletable(&fingerprint, cutoff_ms, min_points_to_keep).await
                } else {
                    self.store.delete_series_keeping_minimum(&fingerprint, cutoff_ms, min_points_to_keep).await
                };

                if deleted > 0 {
                    report.deleted_count += deleted;
                    *report.by_metric.entry(fingerprint.name.clone()).or_default() += deleted;
                    *report.by_rule.entry(rule_key).or_default() += deleted;
                }
            }
        }
        report
    }

    /// Dry-run helper: counts how many points would be removed without
    /// mutating the store, by querying the series directly.
    async fn count_deletable(&self, fingerprint: &crate::domain::models::sample::SeriesFingerprint, cutoff_ms: i64, keep_at_least: usize) -> usize {
        let points = self
            .store
            .query(Some(&fingerprint.name), None, None, Some(&fingerprint.labels.clone().into_iter().collect()), None, None)
            .await;
        let older = points.iter().filter(|p| p.timestamp_ms < cutoff_ms).count();
        older.min(points.len().saturating_sub(keep_at_least))
    }

    /// Starts a background sweep every `period`. Errors are logged and never
    /// stop the loop (§4.6, §7 "Retention errors continue to the next metric").
    pub async fn start_auto(self: &Arc<Self>, period: Duration) {
        let mut task = self.auto_task.lock().await;
        if task.is_some() {
            return;
        }
        let engine = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let now_ms = chrono::Utc::now().timestamp_millis();
                let report = engine.apply(now_ms, false).await;
                if !report.errors.is_empty() {
                    error!(errors = ?report.errors, "retention sweep reported errors");
                } else {
                    info!(deleted = report.deleted_count, "retention sweep complete");
                }
            }
        }));
    }

    pub async fn stop_auto(&self) {
        if let Some(handle) = self.auto_task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::sample::{MetricSample, SampleValue};
    use crate::services::timeseries_store::InMemoryStore;

    fn sample(name: &str, ts: i64) -> MetricSample {
        MetricSample::new(name, SampleValue::Number(1.0), ts)
    }

    #[tokio::test]
    async fn retention_sweep_deletes_exactly_the_oldest_points() {
        // Testable scenario 4 (§8): 10 samples at now - {2,4,...,20} minutes,
        // rule cpu_* retains 15m -> exactly the oldest 3 are deleted.
        let store: Arc<dyn TimeSeriesStore> = Arc::new(InMemoryStore::default());
        let now_ms = 20 * 60_000;
        for minutes_ago in (2..=20).step_by(2) {
            store.store(vec![sample("cpu_usage", now_ms - minutes_ago * 60_000)]).await.unwrap();
        }

        let engine = RetentionEngine::new(Arc::clone(&store), Duration::from_secs(3600));
        engine.add_rule(RetentionRule::new("cpu_*", Duration::from_secs(15 * 60), 0)).await;

        let report = engine.apply(now_ms, false).await;
        assert_eq!(report.deleted_count, 3);

        let remaining = store
            .query(Some("cpu_usage"), Some(now_ms - 3_600_000), Some(now_ms), None, None, None)
            .await;
        assert_eq!(remaining.len(), 7);
    }

    #[tokio::test]
    async fn min_points_to_keep_overrides_an_otherwise_total_cutoff() {
        let store: Arc<dyn TimeSeriesStore> = Arc::new(InMemoryStore::default());
        let now_ms = 100_000;
        for i in 0..5 {
            store.store(vec![sample("cpu_usage", i * 1_000)]).await.unwrap();
        }
        let engine = RetentionEngine::new(Arc::clone(&store), Duration::from_secs(1));
        let mut rule = RetentionRule::new("cpu_*", Duration::from_millis(1), 0);
        rule.min_points_to_keep = 2;
        engine.add_rule(rule).await;

        engine.apply(now_ms, false).await;
        let remaining = store.query(Some("cpu_usage"), None, None, None, None, None).await;
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn same_priority_ties_break_toward_longest_literal_prefix() {
        let store: Arc<dyn TimeSeriesStore> = Arc::new(InMemoryStore::default());
        let engine = RetentionEngine::new(store, Duration::from_secs(60));
        engine.add_rule(RetentionRule::new("cpu_*", Duration::from_secs(10), 0)).await;
        engine.add_rule(RetentionRule::new("cpu_usage_percent", Duration::from_secs(20), 0)).await;

        let retention = engine.retention_for("cpu_usage_percent", &HashMap::new()).await;
        assert_eq!(retention, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn unmatched_metric_falls_back_to_default_retention() {
        let store: Arc<dyn TimeSeriesStore> = Arc::new(InMemoryStore::default());
        let engine = RetentionEngine::new(store, Duration::from_secs(42));
        let retention = engine.retention_for("unrelated_metric", &HashMap::new()).await;
        assert_eq!(retention, Duration::from_secs(42));
    }
}

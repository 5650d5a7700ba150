//! Time-series store (C2, §4.5): append, query, and aggregate metric samples.
//!
//! Two backends satisfy the same [`TimeSeriesStore`] contract: [`InMemoryStore`]
//! keeps a bounded, lock-protected index per series; [`FileBackedStore`] wraps
//! one with a durable append-only log, rebuilt on open and rewritten wholesale
//! by [`FileBackedStore::compact`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::domain::errors::CoreError;
use crate::domain::models::sample::{Aggregation, MetricSample, SampleValue, SeriesFingerprint};

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub series_count: usize,
    pub total_points: usize,
    pub points_written: u64,
    pub points_evicted: u64,
    pub points_deleted: u64,
}

/// One bucket of a `query_range` result; `value` is `None` for an empty bucket (§4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangePoint {
    pub timestamp_ms: i64,
    pub value: Option<f64>,
}

/// Capability interface over the point store. Implementations are concrete
/// backends, not a class hierarchy, the way `Hook` and `Collector` are.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn store(&self, samples: Vec<MetricSample>) -> Result<(), CoreError>;

    #[allow(clippy::too_many_arguments)]
    async fn query(
        &self,
        name: Option<&str>,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        labels: Option<&HashMap<String, String>>,
        aggregation: Option<Aggregation>,
        limit: Option<usize>,
    ) -> Vec<MetricSample>;

    async fn query_latest(
        &self,
        name: &str,
        labels: Option<&HashMap<String, String>>,
    ) -> Option<MetricSample>;

    #[allow(clippy::too_many_arguments)]
    async fn query_range(
        &self,
        name: &str,
        start_ms: i64,
        end_ms: i64,
        step_ms: i64,
        labels: Option<&HashMap<String, String>>,
        aggregation: Aggregation,
    ) -> Vec<RangePoint>;

    async fn metric_names(&self) -> Vec<String>;
    async fn label_keys(&self, name: Option<&str>) -> Vec<String>;
    async fn label_values(&self, key: &str, name: Option<&str>) -> Vec<String>;

    #[allow(clippy::too_many_arguments)]
    async fn aggregate(
        &self,
        name: &str,
        aggregation: Aggregation,
        start_ms: i64,
        end_ms: i64,
        interval_ms: i64,
        labels: Option<&HashMap<String, String>>,
    ) -> Vec<(i64, f64)>;

    /// Bulk delete: every point older than `before_ms`, optionally restricted
    /// to one metric name. Returns the number of points removed.
    async fn delete(&self, name: Option<&str>, before_ms: i64) -> usize;

    /// Deletes points older than `before_ms` from one series, but never lets
    /// it drop below `keep_at_least` points (§4.5 "Retention interaction").
    async fn delete_series_keeping_minimum(
        &self,
        fingerprint: &SeriesFingerprint,
        before_ms: i64,
        keep_at_least: usize,
    ) -> usize;

    /// Every series whose metric name matches the glob `name_pattern` (used by
    /// the retention engine, whose rules are patterns, not exact names).
    async fn fingerprints_matching(&self, name_pattern: &str) -> Vec<SeriesFingerprint>;

    async fn stats(&self) -> StoreStats;
}

fn in_window(sample: &MetricSample, start_ms: Option<i64>, end_ms: Option<i64>) -> bool {
    start_ms.is_none_or(|s| sample.timestamp_ms >= s) && end_ms.is_none_or(|e| sample.timestamp_ms <= e)
}

fn labels_match(sample: &MetricSample, filter: Option<&HashMap<String, String>>) -> bool {
    match filter {
        None => true,
        Some(filter) => filter.iter().all(|(k, v)| sample.labels.get(k) == Some(v)),
    }
}

/// `ceil((end - start) / step) + 1` buckets, each `[t, t + step)` (§4.5, §8
/// "Range completeness").
fn bucketed(
    samples: &[&MetricSample],
    start_ms: i64,
    end_ms: i64,
    step_ms: i64,
    aggregation: Aggregation,
) -> Vec<(i64, Option<f64>)> {
    let step = step_ms.max(1);
    let bucket_count = ((end_ms - start_ms).max(0) + step - 1) / step + 1;
    (0..bucket_count)
        .map(|i| {
            let bucket_start = start_ms + i * step;
            let bucket_end = bucket_start + step;
            let in_bucket: Vec<&MetricSample> = samples
                .iter()
                .copied()
                .filter(|s| s.timestamp_ms >= bucket_start && s.timestamp_ms < bucket_end)
                .collect();
            (bucket_start, aggregation.apply(&in_bucket))
        })
        .collect()
}

#[derive(Default)]
struct State {
    series: HashMap<SeriesFingerprint, VecDeque<MetricSample>>,
    by_name: HashMap<String, HashSet<SeriesFingerprint>>,
    stats: StoreStats,
}

impl State {
    fn candidates(&self, name: &str, labels: Option<&HashMap<String, String>>) -> Vec<&MetricSample> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|fp| self.series.get(fp))
            .flat_map(|series| series.iter())
            .filter(|s| labels_match(s, labels))
            .collect()
    }

    fn prune_empty(&mut self) {
        let empty: Vec<SeriesFingerprint> = self
            .series
            .iter()
            .filter(|(_, points)| points.is_empty())
            .map(|(fp, _)| fp.clone())
            .collect();
        for fp in empty {
            self.series.remove(&fp);
            if let Some(set) = self.by_name.get_mut(&fp.name) {
                set.remove(&fp);
                if set.is_empty() {
                    self.by_name.remove(&fp.name);
                }
            }
        }
    }
}

/// Lock-protected in-memory backend, bounded per series (§4.5 "Backends").
pub struct InMemoryStore {
    state: RwLock<State>,
    max_points_per_series: usize,
}

impl InMemoryStore {
    pub fn new(max_points_per_series: usize) -> Self {
        Self {
            state: RwLock::new(State::default()),
            max_points_per_series: max_points_per_series.max(1),
        }
    }

    pub(crate) async fn all_samples(&self) -> Vec<MetricSample> {
        let state = self.state.read().await;
        state.series.values().flat_map(|series| series.iter().cloned()).collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl TimeSeriesStore for InMemoryStore {
    async fn store(&self, samples: Vec<MetricSample>) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        for sample in samples {
            let fingerprint = sample.fingerprint();
            state
                .by_name
                .entry(fingerprint.name.clone())
                .or_default()
                .insert(fingerprint.clone());
            let series = state.series.entry(fingerprint).or_default();
            series.push_back(sample);
            state.stats.points_written += 1;
            if series.len() > self.max_points_per_series {
                series.pop_front();
                state.stats.points_evicted += 1;
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        name: Option<&str>,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        labels: Option<&HashMap<String, String>>,
        aggregation: Option<Aggregation>,
        limit: Option<usize>,
    ) -> Vec<MetricSample> {
        let state = self.state.read().await;
        let names: Vec<String> = match name {
            Some(n) => vec![n.to_string()],
            None => state.by_name.keys().cloned().collect(),
        };

        let mut results = match aggregation {
            None => {
                let mut results: Vec<MetricSample> = names
                    .iter()
                    .flat_map(|n| state.candidates(n, labels))
                    .filter(|s| in_window(s, start_ms, end_ms))
                    .cloned()
                    .collect();
                results.sort_by_key(|s| s.timestamp_ms);
                results
            }
            Some(agg) => {
                let mut results = Vec::new();
                for fp in names.iter().flat_map(|n| state.by_name.get(n)).flatten() {
                    let Some(series) = state.series.get(fp) else { continue };
                    let matching: Vec<&MetricSample> = series
                        .iter()
                        .filter(|s| labels_match(s, labels) && in_window(s, start_ms, end_ms))
                        .collect();
                    if matching.is_empty() {
                        continue;
                    }
                    if let Some(value) = agg.apply(&matching) {
                        let last_ts = matching.last().map(|s| s.timestamp_ms).unwrap_or(0);
                        let mut sample = MetricSample::new(fp.name.clone(), SampleValue::Number(value), last_ts);
                        sample.labels = fp.labels.clone();
                        results.push(sample);
                    }
                }
                results.sort_by_key(|s| s.timestamp_ms);
                results
            }
        };

        if let Some(limit) = limit {
            results.truncate(limit);
        }
        results
    }

    async fn query_latest(&self, name: &str, labels: Option<&HashMap<String, String>>) -> Option<MetricSample> {
        let state = self.state.read().await;
        state
            .candidates(name, labels)
            .into_iter()
            .max_by_key(|s| s.timestamp_ms)
            .cloned()
    }

    async fn query_range(
        &self,
        name: &str,
        start_ms: i64,
        end_ms: i64,
        step_ms: i64,
        labels: Option<&HashMap<String, String>>,
        aggregation: Aggregation,
    ) -> Vec<RangePoint> {
        let state = self.state.read().await;
        let candidates = state.candidates(name, labels);
        bucketed(&candidates, start_ms, end_ms, step_ms, aggregation)
            .into_iter()
            .map(|(timestamp_ms, value)| RangePoint { timestamp_ms, value })
            .collect()
    }

    async fn metric_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    async fn label_keys(&self, name: Option<&str>) -> Vec<String> {
        let state = self.state.read().await;
        let fingerprints: Vec<&SeriesFingerprint> = match name {
            Some(n) => state.by_name.get(n).into_iter().flatten().collect(),
            None => state.series.keys().collect(),
        };
        let mut keys: HashSet<String> = HashSet::new();
        for fp in fingerprints {
            keys.extend(fp.labels.keys().cloned());
        }
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        keys
    }

    async fn label_values(&self, key: &str, name: Option<&str>) -> Vec<String> {
        let state = self.state.read().await;
        let fingerprints: Vec<&SeriesFingerprint> = match name {
            Some(n) => state.by_name.get(n).into_iter().flatten().collect(),
            None => state.series.keys().collect(),
        };
        let mut values: HashSet<String> = HashSet::new();
        for fp in fingerprints {
            if let Some(v) = fp.labels.get(key) {
                values.insert(v.clone());
            }
        }
        let mut values: Vec<String> = values.into_iter().collect();
        values.sort();
        values
    }

    async fn aggregate(
        &self,
        name: &str,
        aggregation: Aggregation,
        start_ms: i64,
        end_ms: i64,
        interval_ms: i64,
        labels: Option<&HashMap<String, String>>,
    ) -> Vec<(i64, f64)> {
        let state = self.state.read().await;
        let candidates = state.candidates(name, labels);
        bucketed(&candidates, start_ms, end_ms, interval_ms, aggregation)
            .into_iter()
            .filter_map(|(ts, value)| value.map(|v| (ts, v)))
            .collect()
    }

    async fn delete(&self, name: Option<&str>, before_ms: i64) -> usize {
        let fingerprints: Vec<SeriesFingerprint> = {
            let state = self.state.read().await;
            match name {
                Some(n) => state.by_name.get(n).into_iter().flatten().cloned().collect(),
                None => state.series.keys().cloned().collect(),
            }
        };
        let mut deleted = 0;
        for fingerprint in fingerprints {
            deleted += self.delete_series_keeping_minimum(&fingerprint, before_ms, 0).await;
        }
        self.state.write().await.prune_empty();
        deleted
    }

    async fn delete_series_keeping_minimum(
        &self,
        fingerprint: &SeriesFingerprint,
        before_ms: i64,
        keep_at_least: usize,
    ) -> usize {
        let mut state = self.state.write().await;
        let Some(series) = state.series.get_mut(fingerprint) else {
            return 0;
        };
        let mut deleted = 0;
        while series.len() > keep_at_least {
            match series.front() {
                Some(point) if point.timestamp_ms < before_ms => {
                    series.pop_front();
                    deleted += 1;
                }
                _ => break,
            }
        }
        state.stats.points_deleted += deleted as u64;
        deleted
    }

    async fn fingerprints_matching(&self, name_pattern: &str) -> Vec<SeriesFingerprint> {
        let state = self.state.read().await;
        let Ok(pattern) = glob::Pattern::new(name_pattern) else {
            return Vec::new();
        };
        state
            .by_name
            .iter()
            .filter(|(name, _)| pattern.matches(name))
            .flat_map(|(_, fingerprints)| fingerprints.iter().cloned())
            .collect()
    }

    async fn stats(&self) -> StoreStats {
        let state = self.state.read().await;
        let mut stats = state.stats.clone();
        stats.series_count = state.series.len();
        stats.total_points = state.series.values().map(VecDeque::len).sum();
        stats
    }
}

/// Durable backend: an [`InMemoryStore`] fronting an append-only JSON-lines
/// log, replayed on [`FileBackedStore::open`] and rewritten wholesale by
/// [`FileBackedStore::compact`] (§4.5 "write-append log with periodic compaction").
pub struct FileBackedStore {
    inner: InMemoryStore,
    log: Mutex<tokio::fs::File>,
    path: PathBuf,
}

impl FileBackedStore {
    pub async fn open(path: impl Into<PathBuf>, max_points_per_series: usize) -> Result<Self, CoreError> {
        let path = path.into();
        let inner = InMemoryStore::new(max_points_per_series);

        if let Ok(contents) = tokio::fs::read_to_string(&path).await {
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<MetricSample>(line) {
                    Ok(sample) => {
                        let _ = inner.store(vec![sample]).await;
                    }
                    Err(err) => warn!(error = %err, path = %path.display(), "skipping corrupt time-series log line"),
                }
            }
        }

        let log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(CoreError::from)?;

        Ok(Self { inner, log: Mutex::new(log), path })
    }

    /// Rewrites the log from the current in-memory index, dropping entries
    /// already removed by eviction or retention. Cheap to call after a
    /// retention sweep; not done automatically on every write.
    pub async fn compact(&self) -> Result<(), CoreError> {
        let snapshot = self.inner.all_samples().await;
        let tmp_path = self.path.with_extension("compact.tmp");
        {
            let mut tmp = tokio::fs::File::create(&tmp_path).await.map_err(CoreError::from)?;
            for sample in &snapshot {
                let line = serde_json::to_string(sample)?;
                tmp.write_all(line.as_bytes()).await.map_err(CoreError::from)?;
                tmp.write_all(b"\n").await.map_err(CoreError::from)?;
            }
            tmp.flush().await.map_err(CoreError::from)?;
        }
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(CoreError::from)?;
        *self.log.lock().await = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }
}

#[async_trait]
impl TimeSeriesStore for FileBackedStore {
    async fn store(&self, samples: Vec<MetricSample>) -> Result<(), CoreError> {
        {
            let mut log = self.log.lock().await;
            for sample in &samples {
                let line = serde_json::to_string(sample)?;
                log.write_all(line.as_bytes()).await.map_err(CoreError::from)?;
                log.write_all(b"\n").await.map_err(CoreError::from)?;
            }
            log.flush().await.map_err(CoreError::from)?;
        }
        self.inner.store(samples).await
    }

    async fn query(
        &self,
        name: Option<&str>,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        labels: Option<&HashMap<String, String>>,
        aggregation: Option<Aggregation>,
        limit: Option<usize>,
    ) -> Vec<MetricSample> {
        self.inner.query(name, start_ms, end_ms, labels, aggregation, limit).await
    }

    async fn query_latest(&self, name: &str, labels: Option<&HashMap<String, String>>) -> Option<MetricSample> {
        self.inner.query_latest(name, labels).await
    }

    async fn query_range(
        &self,
        name: &str,
        start_ms: i64,
        end_ms: i64,
        step_ms: i64,
        labels: Option<&HashMap<String, String>>,
        aggregation: Aggregation,
    ) -> Vec<RangePoint> {
        self.inner.query_range(name, start_ms, end_ms, step_ms, labels, aggregation).await
    }

    async fn metric_names(&self) -> Vec<String> {
        self.inner.metric_names().await
    }

    async fn label_keys(&self, name: Option<&str>) -> Vec<String> {
        self.inner.label_keys(name).await
    }

    async fn label_values(&self, key: &str, name: Option<&str>) -> Vec<String> {
        self.inner.label_values(key, name).await
    }

    async fn aggregate(
        &self,
        name: &str,
        aggregation: Aggregation,
        start_ms: i64,
        end_ms: i64,
        interval_ms: i64,
        labels: Option<&HashMap<String, String>>,
    ) -> Vec<(i64, f64)> {
        self.inner.aggregate(name, aggregation, start_ms, end_ms, interval_ms, labels).await
    }

    async fn delete(&self, name: Option<&str>, before_ms: i64) -> usize {
        self.inner.delete(name, before_ms).await
    }

    async fn delete_series_keeping_minimum(
        &self,
        fingerprint: &SeriesFingerprint,
        before_ms: i64,
        keep_at_least: usize,
    ) -> usize {
        self.inner.delete_series_keeping_minimum(fingerprint, before_ms, keep_at_least).await
    }

    async fn fingerprints_matching(&self, name_pattern: &str) -> Vec<SeriesFingerprint> {
        self.inner.fingerprints_matching(name_pattern).await
    }

    async fn stats(&self) -> StoreStats {
        self.inner.stats().await
    }
}

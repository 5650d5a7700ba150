//! The persisted unit of the time-series store (C2).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A sample's value: numeric series support every aggregation; string-valued
/// series only support `last` and `count` (§4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(f64),
    Text(String),
}

impl SampleValue {
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// A single point in a time series: name, value, timestamp, labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: SampleValue,
    pub timestamp_ms: i64,
    /// Unique keys; stored sorted so fingerprinting is deterministic.
    pub labels: BTreeMap<String, String>,
    pub unit: Option<String>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: SampleValue, timestamp_ms: i64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp_ms,
            labels: BTreeMap::new(),
            unit: None,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Canonical identity of the series this sample belongs to: `(name, sorted label pairs)`.
    pub fn fingerprint(&self) -> SeriesFingerprint {
        SeriesFingerprint {
            name: self.name.clone(),
            labels: self.labels.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesFingerprint {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl SeriesFingerprint {
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            labels,
        }
    }
}

/// Aggregation functions supported by `query`/`query_range`/`aggregate` (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Avg,
    Sum,
    Min,
    Max,
    Count,
    Last,
}

impl Aggregation {
    /// Applies this aggregation to an ordered slice of samples.
    ///
    /// For string-valued series only `Last`/`Count` are defined; other
    /// aggregations silently skip non-numeric points.
    pub fn apply(self, samples: &[&MetricSample]) -> Option<f64> {
        if samples.is_empty() {
            return match self {
                Self::Count => Some(0.0),
                _ => None,
            };
        }
        match self {
            Self::Count => Some(samples.len() as f64),
            Self::Last => samples.last().and_then(|s| s.value.as_f64()),
            _ => {
                let numeric: Vec<f64> = samples.iter().filter_map(|s| s.value.as_f64()).collect();
                if numeric.is_empty() {
                    return None;
                }
                Some(match self {
                    Self::Avg => numeric.iter().sum::<f64>() / numeric.len() as f64,
                    Self::Sum => numeric.iter().sum(),
                    Self::Min => numeric.iter().copied().fold(f64::INFINITY, f64::min),
                    Self::Max => numeric.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    Self::Count | Self::Last => unreachable!(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, value: f64, ts: i64) -> MetricSample {
        MetricSample::new(name, SampleValue::Number(value), ts)
    }

    #[test]
    fn fingerprint_identity_ignores_value_and_timestamp() {
        let a = sample("cpu_usage", 1.0, 100).with_label("host", "a");
        let b = sample("cpu_usage", 99.0, 200).with_label("host", "a");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn avg_aggregation_over_numeric_samples() {
        let samples = vec![sample("x", 2.0, 0), sample("x", 4.0, 1)];
        let refs: Vec<&MetricSample> = samples.iter().collect();
        assert_eq!(Aggregation::Avg.apply(&refs), Some(3.0));
    }

    #[test]
    fn count_aggregation_on_empty_slice_is_zero() {
        assert_eq!(Aggregation::Count.apply(&[]), Some(0.0));
    }

    #[test]
    fn max_on_empty_numeric_is_none() {
        assert_eq!(Aggregation::Max.apply(&[]), None);
    }
}

//! Scrape formatter (C10, §4.8): renders stored samples as Prometheus text
//! exposition format.
//!
//! Name/label sanitization, value escaping, and special-float handling are
//! grounded on the original Prometheus formatter's regex-based cleanup.

use std::collections::HashMap;

use crate::domain::models::sample::{MetricSample, SampleValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        }
    }
}

/// Coerces `raw` to `[A-Za-z_:][A-Za-z0-9_:]*`: invalid runs become `_`,
/// consecutive `_` collapse, trailing `_` is stripped, and a leading digit
/// gets a `_` prefix. Empty results become `unnamed_metric`.
fn sanitize_metric_name(raw: &str) -> String {
    sanitize(raw, true, "unnamed_metric")
}

/// Same rules as metric names but never allows a `__` prefix and falls back
/// to `label` when empty.
fn sanitize_label_name(raw: &str) -> String {
    let mut name = sanitize(raw, false, "label");
    while name.starts_with("__") {
        name = name[2..].to_string();
    }
    if name.is_empty() {
        "label".to_string()
    } else {
        name
    }
}

fn sanitize(raw: &str, allow_colon: bool, fallback: &str) -> String {
    let is_valid = |c: char| c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':');
    let mut out = String::with_capacity(raw.len());
    let mut last_was_underscore = false;
    for c in raw.chars() {
        if is_valid(c) {
            out.push(c);
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    let out = out.trim_end_matches('_').to_string();
    let out = match out.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("_{out}"),
        Some(_) => out,
        None => return fallback.to_string(),
    };
    if out.is_empty() {
        fallback.to_string()
    } else {
        out
    }
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{value}")
    }
}

fn format_value(value: &SampleValue) -> String {
    match value {
        SampleValue::Number(n) => format_float(*n),
        SampleValue::Text(s) => s.clone(),
    }
}

/// Declared-type-absent inference from the family name (§4.8).
fn infer_type(family: &str) -> MetricType {
    if family.ends_with("_bucket") || family.ends_with("_sum") {
        MetricType::Histogram
    } else if family.ends_with("_total") || family.ends_with("_count") || family.ends_with("_bytes") || family.ends_with("_seconds") {
        MetricType::Counter
    } else {
        MetricType::Gauge
    }
}

/// Renders samples as Prometheus exposition text (§4.8). Holds optional
/// per-family HELP text and explicit type overrides registered at startup.
#[derive(Default)]
pub struct ScrapeFormatter {
    help_text: HashMap<String, String>,
    explicit_types: HashMap<String, MetricType>,
}

impl ScrapeFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_help(&mut self, family: impl Into<String>, text: impl Into<String>) {
        self.help_text.insert(family.into(), text.into());
    }

    pub fn set_type(&mut self, family: impl Into<String>, metric_type: MetricType) {
        self.explicit_types.insert(family.into(), metric_type);
    }

    fn format_labels(&self, sample: &MetricSample) -> String {
        if sample.labels.is_empty() {
            return String::new();
        }
        sample
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", sanitize_label_name(k), escape_label_value(v)))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn format_line(&self, name: &str, sample: &MetricSample) -> String {
        let labels = self.format_labels(sample);
        let value = format_value(&sample.value);
        if labels.is_empty() {
            format!("{name} {value} {}", sample.timestamp_ms)
        } else {
            format!("{name}{{{labels}}} {value} {}", sample.timestamp_ms)
        }
    }

    /// Renders `samples` grouped by sanitized metric name, families sorted by
    /// name and samples within a family sorted by label tuple so that a fixed
    /// set of samples always produces byte-identical output (§8). Each family
    /// is preceded by one TYPE and one HELP line, in that order (§4.8).
    pub fn format(&self, samples: &[MetricSample]) -> String {
        let mut grouped: HashMap<String, Vec<&MetricSample>> = HashMap::new();
        for sample in samples {
            let name = sanitize_metric_name(&sample.name);
            grouped.entry(name).or_default().push(sample);
        }
        let mut names: Vec<&String> = grouped.keys().collect();
        names.sort();

        let mut out = String::new();
        for name in names {
            let metric_type = self.explicit_types.get(name).copied().unwrap_or_else(|| infer_type(name));
            let help = self
                .help_text
                .get(name)
                .cloned()
                .unwrap_or_else(|| format!("Metric {name}"));
            out.push_str(&format!("# TYPE {name} {}\n", metric_type.as_str()));
            out.push_str(&format!("# HELP {name} {help}\n"));

            let mut family = grouped[name].clone();
            family.sort_by(|a, b| {
                let a_tuple: Vec<(&String, &String)> = a.labels.iter().collect();
                let b_tuple: Vec<(&String, &String)> = b.labels.iter().collect();
                a_tuple.cmp(&b_tuple)
            });
            for sample in family {
                out.push_str(&self.format_line(name, sample));
                out.push('\n');
            }
        }
        out
    }
}

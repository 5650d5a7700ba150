//! Event envelope and payload kinds (C1).
//!
//! Every signal entering the bus — a file change, a metric crossing a
//! threshold, a container lifecycle transition — is wrapped in the same
//! envelope so subscribers can filter and dispatch uniformly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Severity common to every event, independent of its payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// Tagged union of everything that can flow through the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    File(FileEvent),
    MetricThreshold(MetricThresholdEvent),
    System(SystemEvent),
    Git(GitEvent),
    Build(BuildEvent),
    Dependency(DependencyEvent),
    Lifecycle(LifecycleEvent),
}

impl EventPayload {
    /// Short discriminant name, used for subscription kind-filters and logging.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::MetricThreshold(_) => "metric_threshold",
            Self::System(_) => "system",
            Self::Git(_) => "git",
            Self::Build(_) => "build",
            Self::Dependency(_) => "dependency",
            Self::Lifecycle(_) => "lifecycle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Create,
    Modify,
    Delete,
    Rename,
    Save,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    pub operation: FileOperation,
    pub path: String,
    /// Derived from the path's extension at construction time.
    pub file_type: String,
    /// Present iff `operation == Rename`.
    pub old_path: Option<String>,
    pub content_hash: Option<String>,
    pub size: Option<u64>,
}

impl FileEvent {
    /// Builds a `FileEvent`, deriving `file_type` from `path`'s extension.
    ///
    /// # Panics
    /// Panics if `operation == Rename` and `old_path` is `None` — this is an
    /// invariant violation, not a recoverable error.
    pub fn new(operation: FileOperation, path: impl Into<String>, old_path: Option<String>) -> Self {
        let path = path.into();
        assert!(
            !(matches!(operation, FileOperation::Rename) && old_path.is_none()),
            "FileEvent::Rename requires old_path"
        );
        let file_type = std::path::Path::new(&path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or_else(|| "unknown".to_string(), str::to_lowercase);
        Self {
            operation,
            path,
            file_type,
            old_path,
            content_hash: None,
            size: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
}

impl Comparator {
    pub fn evaluate(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Gte => value >= threshold,
            Self::Lte => value <= threshold,
            Self::Eq => (value - threshold).abs() < f64::EPSILON,
            Self::Neq => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdDescriptor {
    pub value: f64,
    pub comparator: Comparator,
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricThresholdEvent {
    pub metric_name: String,
    pub value: f64,
    pub threshold: ThresholdDescriptor,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub component: String,
    pub status: String,
    pub details: String,
    pub affected_services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitEvent {
    pub repository: String,
    pub branch: String,
    pub commit_hash: String,
    pub author: String,
    pub message: String,
    pub files_changed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildEvent {
    pub project: String,
    pub build_id: String,
    pub build_type: String,
    pub duration_secs: Option<f64>,
    pub artifacts: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEvent {
    pub package: String,
    pub version: String,
    pub previous_version: String,
    pub ecosystem: String,
    pub vulnerabilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Create,
    Start,
    Stop,
    Restart,
    Die,
    Kill,
    Pause,
    Unpause,
    Destroy,
    HealthStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub container_id: String,
    pub container_name: String,
    pub image: String,
    pub action: LifecycleAction,
    pub timestamp_ms: i64,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
}

/// The common envelope wrapping every payload kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp_ms: i64,
    pub source: String,
    pub severity: EventSeverity,
    pub labels: HashMap<String, String>,
    pub payload: EventPayload,
    pub correlation_id: Option<String>,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        timestamp_ms: i64,
        source: impl Into<String>,
        severity: EventSeverity,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp_ms,
            source: source.into(),
            severity,
            labels: HashMap::new(),
            payload,
            correlation_id: None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        self.payload.kind_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_event_derives_file_type_from_extension() {
        let event = FileEvent::new(FileOperation::Modify, "src/main.rs", None);
        assert_eq!(event.file_type, "rs");
    }

    #[test]
    #[should_panic(expected = "Rename requires old_path")]
    fn rename_without_old_path_panics() {
        let _ = FileEvent::new(FileOperation::Rename, "b.rs", None);
    }

    #[test]
    fn comparator_evaluates_expected_relations() {
        assert!(Comparator::Gt.evaluate(85.0, 80.0));
        assert!(!Comparator::Lte.evaluate(85.0, 80.0));
        assert!(Comparator::Eq.evaluate(1.0, 1.0));
    }

    #[test]
    fn event_kind_name_reflects_payload() {
        let event = Event::new(
            "evt-1",
            0,
            "watcher",
            EventSeverity::Info,
            EventPayload::File(FileEvent::new(FileOperation::Create, "a.txt", None)),
        );
        assert_eq!(event.kind_name(), "file");
    }
}

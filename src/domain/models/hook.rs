//! Hook model: a user-provided automation unit with a guard and an action (C6/C7, §3).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::event::Event;

/// Execution priority. Lower variants run first within a topological tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

/// Advisory resource footprint a hook declares for the caller's own bookkeeping.
///
/// Not enforced by the dispatcher — the global semaphore (§4.3/§5) is the
/// only scheduling cap; this is metadata callers may use for their own
/// decisions (e.g. whether to co-schedule two resource-scaling hooks).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub cpu_millis: u32,
    pub memory_mb: u32,
    pub disk_mb: u32,
    pub network: bool,
}

/// Snapshot of prior project/system/user state a hook may consult.
#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct SystemMetricsSnapshot {
    pub values: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct UserPreferences {
    pub values: HashMap<String, String>,
}

/// Immutable record of one hook's outcome within a dispatch, folded into the
/// next hook's `execution_history`.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub hook_id: String,
    pub result: HookResult,
}

/// Context handed to a hook. Each dispatch step produces a *new* context with
/// an extended `execution_history` rather than mutating a shared one.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub trigger_event: Event,
    pub project_state: ProjectState,
    pub system_metrics: SystemMetricsSnapshot,
    pub user_preferences: UserPreferences,
    pub execution_id: String,
    pub timestamp_ms: i64,
    pub execution_history: Vec<ExecutionRecord>,
}

impl HookContext {
    pub fn new(trigger_event: Event, execution_id: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            trigger_event,
            project_state: ProjectState::default(),
            system_metrics: SystemMetricsSnapshot::default(),
            user_preferences: UserPreferences::default(),
            execution_id: execution_id.into(),
            timestamp_ms,
            execution_history: Vec::new(),
        }
    }

    /// Returns a new context with `record` appended, leaving `self` untouched.
    #[must_use]
    pub fn with_record(&self, record: ExecutionRecord) -> Self {
        let mut history = self.execution_history.clone();
        history.push(record);
        Self {
            trigger_event: self.trigger_event.clone(),
            project_state: self.project_state.clone(),
            system_metrics: self.system_metrics.clone(),
            user_preferences: self.user_preferences.clone(),
            execution_id: self.execution_id.clone(),
            timestamp_ms: self.timestamp_ms,
            execution_history: history,
        }
    }
}

/// Error kind attached to a failed `HookResult` (subset of `CoreError` relevant
/// to hook execution, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookErrorKind {
    Execution,
    Timeout,
}

/// Outcome of one hook's execution.
#[derive(Debug, Clone)]
pub struct HookResult {
    pub success: bool,
    pub message: String,
    pub actions_taken: Vec<String>,
    pub suggestions: Vec<String>,
    pub metrics: HashMap<String, f64>,
    pub execution_time_ms: u64,
    pub error: Option<HookErrorKind>,
}

impl HookResult {
    pub fn success(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            message: message.into(),
            actions_taken: Vec::new(),
            suggestions: Vec::new(),
            metrics: HashMap::new(),
            execution_time_ms,
            error: None,
        }
    }

    pub fn failure(
        message: impl Into<String>,
        kind: HookErrorKind,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            actions_taken: Vec::new(),
            suggestions: Vec::new(),
            metrics: HashMap::new(),
            execution_time_ms,
            error: Some(kind),
        }
    }

    pub fn timeout(timeout: Duration, execution_time_ms: u64) -> Self {
        let mut result = Self::failure(
            format!("hook execution exceeded its {}ms timeout", timeout.as_millis()),
            HookErrorKind::Timeout,
            execution_time_ms,
        );
        result
            .suggestions
            .push("Increase the hook timeout or optimize the hook's logic".to_string());
        result
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// A user-provided automation unit (§3 Hook, §4.3 dispatch algorithm).
///
/// Implementations are concrete records, not a class hierarchy: this trait is
/// the capability interface every hook implements, the way `Collector` and
/// `NotificationChannel` are the capability interfaces for their subsystems.
#[async_trait]
pub trait Hook: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    fn enabled(&self) -> bool {
        true
    }
    fn priority(&self) -> Priority;
    /// Event kinds (`Event::kind_name`) this hook is registered against.
    fn triggers(&self) -> HashSet<String>;
    fn timeout(&self) -> Duration;
    fn resource_requirements(&self) -> ResourceRequirements {
        ResourceRequirements::default()
    }

    /// Guard evaluated before `execute`. A panic inside an implementation is
    /// caught by the dispatcher via `catch_unwind` and treated as `false`.
    async fn should_execute(&self, ctx: &HookContext) -> bool;

    /// The hook's action. Must itself respect `timeout()` cooperatively;
    /// the dispatcher also enforces it externally via `tokio::time::timeout`.
    async fn execute(&self, ctx: &HookContext) -> HookResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::{EventPayload, EventSeverity, FileEvent, FileOperation};

    fn test_event() -> Event {
        Event::new(
            "evt-1",
            0,
            "watcher",
            EventSeverity::Info,
            EventPayload::File(FileEvent::new(FileOperation::Save, "a.rs", None)),
        )
    }

    #[test]
    fn priority_ordering_has_critical_first() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }

    #[test]
    fn context_with_record_does_not_mutate_original() {
        let ctx = HookContext::new(test_event(), "exec-1", 0);
        let record = ExecutionRecord {
            hook_id: "h1".to_string(),
            result: HookResult::success("ok", 5),
        };
        let next = ctx.with_record(record);
        assert_eq!(ctx.execution_history.len(), 0);
        assert_eq!(next.execution_history.len(), 1);
    }

    #[test]
    fn timeout_result_suggests_increasing_timeout() {
        let result = HookResult::timeout(Duration::from_millis(100), 150);
        assert!(!result.success);
        assert_eq!(result.error, Some(HookErrorKind::Timeout));
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.contains("Increase the hook timeout")));
    }
}

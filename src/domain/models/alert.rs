//! Alert lifecycle model (§3, §4.7 — C8/C9).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{Comparator, EventSeverity};
use super::sample::MetricSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Firing,
    Acknowledged,
    Resolved,
    Silenced,
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLogic {
    And,
    Or,
}

/// A predicate over recent samples for a single metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCondition {
    pub metric_name: String,
    pub comparator: Comparator,
    pub threshold: f64,
    /// Required label-equality filters over candidate samples.
    pub label_filters: HashMap<String, String>,
    /// Lookback window for selecting candidate samples; defaults to the
    /// engine's evaluation window if unset.
    pub evaluation_window_secs: Option<u64>,
    pub min_sample_count: usize,
}

impl AlertCondition {
    /// Evaluates this condition over the samples already filtered to its
    /// window/labels by the caller.
    pub fn is_met(&self, samples: &[&MetricSample]) -> bool {
        if samples.len() < self.min_sample_count {
            return false;
        }
        samples
            .iter()
            .filter_map(|s| s.value.as_f64())
            .any(|v| self.comparator.evaluate(v, self.threshold))
    }
}

/// A firing rule: conditions, severity, debounce/throttle/auto-resolve timers.
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub conditions: Vec<AlertCondition>,
    pub logic: RuleLogic,
    pub severity: EventSeverity,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub for_duration: Option<Duration>,
    pub throttle_duration: Option<Duration>,
    pub auto_resolve: bool,
    pub resolve_timeout: Option<Duration>,
    pub enabled: bool,

    /// Private timers (§3): when the conditions were first observed true
    /// (reset once firing or once conditions clear), and the last firing time.
    pub first_detected: Option<DateTime<Utc>>,
    pub last_fired: Option<DateTime<Utc>>,
    pub status: AlertStatus,
    pub firing_count: u64,
}

impl AlertRule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, severity: EventSeverity) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            conditions: Vec::new(),
            logic: RuleLogic::And,
            severity,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            for_duration: None,
            throttle_duration: None,
            auto_resolve: true,
            resolve_timeout: None,
            enabled: true,
            first_detected: None,
            last_fired: None,
            status: AlertStatus::Resolved,
            firing_count: 0,
        }
    }

    pub fn conditions_met(&self, by_condition: &[bool]) -> bool {
        match self.logic {
            RuleLogic::And => by_condition.iter().all(|&m| m),
            RuleLogic::Or => by_condition.iter().any(|&m| m),
        }
    }
}

/// One attempt to notify a channel about an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub channel: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// A live or historical alert instance (§3).
#[derive(Debug, Clone)]
pub struct Alert {
    pub alert_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: EventSeverity,
    pub status: AlertStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub triggering_samples: Vec<MetricSample>,
    pub notification_history: Vec<NotificationAttempt>,
    pub notes: Vec<String>,
}

impl Alert {
    pub fn new(alert_id: impl Into<String>, rule: &AlertRule, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            alert_id: alert_id.into(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            status: AlertStatus::Firing,
            message: message.into(),
            created_at: now,
            updated_at: now,
            fired_at: Some(now),
            acknowledged_at: None,
            resolved_at: None,
            labels: rule.labels.clone(),
            annotations: rule.annotations.clone(),
            triggering_samples: Vec::new(),
            notification_history: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn record_notification(&mut self, channel: impl Into<String>, success: bool) {
        self.notification_history.push(NotificationAttempt {
            channel: channel.into(),
            success,
            timestamp: Utc::now(),
        });
    }

    pub fn resolve(&mut self) {
        let now = Utc::now();
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(now);
        self.updated_at = now;
    }

    pub fn acknowledge(&mut self) {
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}

//! Alert rule engine and manager (C8, §4.7).
//!
//! Ported from the rule-evaluation state machine that drives alert firing:
//! a rule is Pending while its conditions hold but `for_duration` has not
//! yet elapsed, Firing once it has (subject to throttling), and resolves
//! either immediately or after `resolve_timeout` once conditions clear.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::models::alert::{Alert, AlertRule, AlertStatus};
use crate::domain::models::sample::MetricSample;
use crate::services::notification_router::NotificationRouter;
use crate::services::timeseries_store::TimeSeriesStore;

/// What one evaluation tick did to a rule's state (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Conditions hold but `for_duration` has not yet elapsed.
    Pending,
    /// Conditions hold, `for_duration` elapsed, and this is the tick that
    /// triggered (or re-triggered past throttling) the alert.
    Firing,
    /// Already firing; throttled, so no new alert this tick.
    StillFiring,
    /// Conditions no longer hold and the rule resolved this tick.
    Resolved,
    /// Conditions do not hold and there is nothing to report.
    Idle,
}

fn matching_samples<'a>(
    condition: &crate::domain::models::alert::AlertCondition,
    samples: &'a [MetricSample],
    now: DateTime<Utc>,
) -> Vec<&'a MetricSample> {
    samples
        .iter()
        .filter(|s| {
            s.name == condition.metric_name
                && condition.label_filters.iter().all(|(k, v)| s.labels.get(k) == Some(v))
                && condition
                    .evaluation_window_secs
                    .is_none_or(|w| now.timestamp_millis() - s.timestamp_ms <= w as i64 * 1000)
        })
        .collect()
}

/// Runs one evaluation tick against `rule`, mutating its internal timers and
/// status in place (§4.7 steps 1-2).
pub fn evaluate(rule: &mut AlertRule, samples: &[MetricSample], now: DateTime<Utc>) -> EvalOutcome {
    let by_condition: Vec<bool> =
        rule.conditions.iter().map(|c| c.is_met(&matching_samples(c, samples, now))).collect();

    if rule.conditions_met(&by_condition) {
        let Some(first_detected) = rule.first_detected else {
            rule.first_detected = Some(now);
            rule.status = AlertStatus::Pending;
            return EvalOutcome::Pending;
        };

        if let Some(for_duration) = rule.for_duration {
            if now.signed_duration_since(first_detected) < chrono::Duration::from_std(for_duration).unwrap() {
                rule.status = AlertStatus::Pending;
                return EvalOutcome::Pending;
            }
        }

        if let (Some(last_fired), Some(throttle)) = (rule.last_fired, rule.throttle_duration) {
            if now.signed_duration_since(last_fired) < chrono::Duration::from_std(throttle).unwrap() {
                return EvalOutcome::StillFiring;
            }
        }

        rule.status = AlertStatus::Firing;
        rule.last_fired = Some(now);
        rule.firing_count += 1;
        EvalOutcome::Firing
    } else {
        let mut outcome = EvalOutcome::Idle;
        if rule.status == AlertStatus::Firing && rule.auto_resolve {
            let should_resolve = match rule.resolve_timeout {
                Some(timeout) => rule
                    .last_fired
                    .is_none_or(|last| now.signed_duration_since(last) >= chrono::Duration::from_std(timeout).unwrap()),
                None => true,
            };
            if should_resolve {
                rule.status = AlertStatus::Resolved;
                outcome = EvalOutcome::Resolved;
            }
        }
        if rule.status != AlertStatus::Firing {
            rule.first_detected = None;
        }
        outcome
    }
}

/// Orchestrates the evaluation cycle across every rule, owns the active-alert
/// map and bounded resolved-history, and hands transitions to the
/// notification router (§4.7).
pub struct AlertManager {
    store: Arc<dyn TimeSeriesStore>,
    router: Arc<NotificationRouter>,
    rules: RwLock<Vec<AlertRule>>,
    active_alerts: RwLock<HashMap<String, Alert>>,
    resolved_history: RwLock<VecDeque<Alert>>,
    max_alerts: usize,
    evaluation_window: Duration,
    eval_task: Mutex<Option<JoinHandle<()>>>,
}

impl AlertManager {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        router: Arc<NotificationRouter>,
        max_alerts: usize,
        evaluation_window: Duration,
    ) -> Self {
        Self {
            store,
            router,
            rules: RwLock::new(Vec::new()),
            active_alerts: RwLock::new(HashMap::new()),
            resolved_history: RwLock::new(VecDeque::new()),
            max_alerts,
            evaluation_window,
            eval_task: Mutex::new(None),
        }
    }

    pub async fn add_rule(&self, rule: AlertRule) {
        let mut rules = self.rules.write().await;
        rules.retain(|existing| existing.id != rule.id);
        rules.push(rule);
    }

    pub async fn remove_rule(&self, id: &str) {
        self.rules.write().await.retain(|rule| rule.id != id);
    }

    pub async fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().await.clone()
    }

    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.active_alerts.read().await.values().cloned().collect()
    }

    pub async fn resolved_history(&self) -> Vec<Alert> {
        self.resolved_history.read().await.iter().cloned().collect()
    }

    pub async fn acknowledge(&self, alert_id: &str) -> bool {
        let mut active = self.active_alerts.write().await;
        if let Some(alert) = active.values_mut().find(|a| a.alert_id == alert_id) {
            alert.acknowledge();
            true
        } else {
            false
        }
    }

    /// Silences an alert; routing checks `alert.status` and short-circuits on
    /// `Silenced`/`Suppressed` (§4.7). With `duration`, an unsilence timer is
    /// spawned; without one the alert stays silenced until `unsilence`.
    pub async fn silence(self: &Arc<Self>, alert_id: &str, duration: Option<Duration>) -> bool {
        let found = {
            let mut active = self.active_alerts.write().await;
            let Some(alert) = active.values_mut().find(|a| a.alert_id == alert_id) else {
                return false;
            };
            alert.status = AlertStatus::Silenced;
            true
        };
        if found {
            if let Some(duration) = duration {
                let manager = Arc::clone(self);
                let alert_id = alert_id.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    manager.unsilence(&alert_id).await;
                });
            }
        }
        found
    }

    pub async fn unsilence(&self, alert_id: &str) -> bool {
        let mut active = self.active_alerts.write().await;
        if let Some(alert) = active.values_mut().find(|a| a.alert_id == alert_id && a.status == AlertStatus::Silenced) {
            alert.status = AlertStatus::Firing;
            true
        } else {
            false
        }
    }

    /// Queries one window of samples per metric referenced by an enabled
    /// rule's conditions, shared across all rules that reference it.
    async fn collect_candidates(&self, now_ms: i64) -> HashMap<String, Vec<MetricSample>> {
        let rules = self.rules.read().await;
        let mut names = HashSet::new();
        for rule in rules.iter().filter(|r| r.enabled) {
            for condition in &rule.conditions {
                names.insert(condition.metric_name.clone());
            }
        }
        drop(rules);

        let mut out = HashMap::new();
        for name in names {
            let samples = self
                .store
                .query(Some(&name), Some(now_ms - self.evaluation_window.as_millis() as i64), Some(now_ms), None, None, None)
                .await;
            out.insert(name, samples);
        }
        out
    }

    /// Runs one full evaluation cycle (§4.7 steps 1-5) using the store's
    /// recent samples.
    pub async fn evaluate_once(&self, now: DateTime<Utc>) {
        let candidates = self.collect_candidates(now.timestamp_millis()).await;
        self.evaluate_with_candidates(&candidates, now).await;
    }

    /// Same cycle but against an explicitly injected sample list, bypassing
    /// the store (§4.7 step 1 "or accept an injected sample list").
    pub async fn evaluate_with_samples(&self, samples: &[MetricSample], now: DateTime<Utc>) {
        let mut candidates: HashMap<String, Vec<MetricSample>> = HashMap::new();
        for sample in samples {
            candidates.entry(sample.name.clone()).or_default().push(sample.clone());
        }
        self.evaluate_with_candidates(&candidates, now).await;
    }

    async fn evaluate_with_candidates(&self, candidates: &HashMap<String, Vec<MetricSample>>, now: DateTime<Utc>) {
        let mut rules = self.rules.write().await;
        let mut active = self.active_alerts.write().await;
        let mut resolved_history = self.resolved_history.write().await;

        for rule in rules.iter_mut().filter(|r| r.enabled) {
            let samples: Vec<MetricSample> = rule
                .conditions
                .iter()
                .flat_map(|c| candidates.get(&c.metric_name).cloned().unwrap_or_default())
                .collect();
            let outcome = evaluate(rule, &samples, now);

            match outcome {
                EvalOutcome::Firing => {
                    if !active.contains_key(&rule.id) {
                        let alert_id = format!("{}-{}", rule.id, now.timestamp_millis());
                        let message = format!("{} is firing", rule.name);
                        active.insert(rule.id.clone(), Alert::new(alert_id, rule, message));
                    }
                    let alert = active.get_mut(&rule.id).expect("just inserted or already present");
                    alert.updated_at = now;
                    info!(rule = %rule.id, alert = %alert.alert_id, "alert firing");
                    if let Err(err) = self.router.route(alert).await {
                        warn!(rule = %rule.id, error = %err, "notification routing failed");
                    }
                }
                EvalOutcome::Resolved => {
                    if let Some(mut alert) = active.remove(&rule.id) {
                        alert.resolve();
                        info!(rule = %rule.id, alert = %alert.alert_id, "alert resolved");
                        if let Err(err) = self.router.route(&mut alert).await {
                            warn!(rule = %rule.id, error = %err, "resolution routing failed");
                        }
                        resolved_history.push_back(alert);
                        while resolved_history.len() > self.max_alerts {
                            resolved_history.pop_front();
                        }
                    }
                }
                EvalOutcome::Pending | EvalOutcome::StillFiring | EvalOutcome::Idle => {}
            }
        }
    }

    /// Starts a background evaluation loop every `interval`.
    pub async fn start_auto(self: &Arc<Self>, interval: Duration) {
        let mut task = self.eval_task.lock().await;
        if task.is_some() {
            return;
        }
        let manager = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.evaluate_once(Utc::now()).await;
            }
        }));
    }

    pub async fn stop_auto(&self) {
        if let Some(handle) = self.eval_task.lock().await.take() {
            handle.abort();
        }
    }
}

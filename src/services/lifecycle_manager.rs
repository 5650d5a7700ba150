//! Lifecycle manager (C11, §4.9): consumes lifecycle events off the bus and
//! derives restart-loop and uptime metrics per container.
//!
//! Subscribes the way every bus consumer does (`EventHandler`, grounded on
//! `event_bus.rs`); the derived samples it writes follow the same
//! `MetricSample` construction the reference collectors use.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::errors::CoreError;
use crate::domain::models::event::{Event, EventPayload, LifecycleAction};
use crate::domain::models::sample::{MetricSample, SampleValue};
use crate::services::event_bus::EventHandler;

/// Availability grade bucket (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl AvailabilityGrade {
    fn from_percentage(pct: f64) -> Self {
        if pct >= 99.0 {
            Self::Excellent
        } else if pct >= 95.0 {
            Self::Good
        } else if pct >= 90.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Per-container restart history within a rolling analysis window (§4.9).
#[derive(Default)]
struct RestartTracker {
    analysis_window_ms: i64,
    timestamps: HashMap<String, Vec<i64>>,
    total_restarts: HashMap<String, u64>,
}

impl RestartTracker {
    fn new(analysis_window_ms: i64) -> Self {
        Self { analysis_window_ms, timestamps: HashMap::new(), total_restarts: HashMap::new() }
    }

    fn record(&mut self, container_id: &str, now_ms: i64) {
        *self.total_restarts.entry(container_id.to_string()).or_default() += 1;
        let entry = self.timestamps.entry(container_id.to_string()).or_default();
        entry.push(now_ms);
        entry.retain(|&ts| now_ms - ts <= self.analysis_window_ms);
    }

    /// `(count within window, is_restart_loop, rate_per_hour)`.
    fn stats(&self, container_id: &str, now_ms: i64) -> (usize, bool, f64) {
        let Some(timestamps) = self.timestamps.get(container_id) else {
            return (0, false, 0.0);
        };
        let within_window: Vec<i64> = timestamps.iter().copied().filter(|&ts| now_ms - ts <= self.analysis_window_ms).collect();
        let count = within_window.len();

        let is_loop = if count >= 4 {
            let intervals: Vec<i64> = within_window.windows(2).map(|w| w[1] - w[0]).collect();
            let avg_interval_ms = intervals.iter().sum::<i64>() as f64 / intervals.len().max(1) as f64;
            avg_interval_ms < 60_000.0
        } else {
            false
        };

        let hours = (self.analysis_window_ms as f64 / 3_600_000.0).max(1.0 / 3_600.0);
        let rate_per_hour = count as f64 / hours;
        (count, is_loop, rate_per_hour)
    }

    fn total(&self, container_id: &str) -> u64 {
        self.total_restarts.get(container_id).copied().unwrap_or(0)
    }
}

/// Escalation curve over a container's restart activity (§4.9): `critical`
/// once the restart-loop threshold fires, `warning` on repeated restarts
/// short of that, `none` otherwise.
fn restart_severity(count: usize, is_loop: bool) -> &'static str {
    if is_loop {
        "critical"
    } else if count >= 2 {
        "warning"
    } else {
        "none"
    }
}

struct UptimeSession {
    start_ms: i64,
    end_ms: Option<i64>,
}

/// Per-container running sessions over a tracking window (§4.9).
#[derive(Default)]
struct UptimeTracker {
    tracking_window_ms: i64,
    sessions: HashMap<String, Vec<UptimeSession>>,
}

impl UptimeTracker {
    fn new(tracking_window_ms: i64) -> Self {
        Self { tracking_window_ms, sessions: HashMap::new() }
    }

    fn start(&mut self, container_id: &str, now_ms: i64) {
        let sessions = self.sessions.entry(container_id.to_string()).or_default();
        if sessions.last().is_none_or(|s| s.end_ms.is_some()) {
            sessions.push(UptimeSession { start_ms: now_ms, end_ms: None });
        }
    }

    fn stop(&mut self, container_id: &str, now_ms: i64) {
        if let Some(sessions) = self.sessions.get_mut(container_id) {
            if let Some(open) = sessions.last_mut().filter(|s| s.end_ms.is_none()) {
                open.end_ms = Some(now_ms);
            }
        }
    }

    fn is_running(&self, container_id: &str) -> bool {
        self.sessions.get(container_id).and_then(|s| s.last()).is_some_and(|s| s.end_ms.is_none())
    }

    /// `(uptime_seconds_since_current_session_start, session_count, avg_session_duration_secs, uptime_percentage)`.
    fn stats(&self, container_id: &str, now_ms: i64) -> (f64, usize, f64, f64) {
        let Some(sessions) = self.sessions.get(container_id) else {
            return (0.0, 0, 0.0, 0.0);
        };
        let window_start = now_ms - self.tracking_window_ms;

        let mut total_up_ms: i64 = 0;
        let mut current_uptime_ms: i64 = 0;
        for session in sessions {
            let end = session.end_ms.unwrap_or(now_ms);
            let clipped_start = session.start_ms.max(window_start);
            if end > clipped_start {
                total_up_ms += end - clipped_start;
            }
            if session.end_ms.is_none() {
                current_uptime_ms = (now_ms - session.start_ms).max(0);
            }
        }

        let window_ms = self.tracking_window_ms.max(1);
        let uptime_pct = (total_up_ms as f64 / window_ms as f64 * 100.0).clamp(0.0, 100.0);
        let avg_session_ms = sessions
            .iter()
            .map(|s| s.end_ms.unwrap_or(now_ms) - s.start_ms)
            .sum::<i64>() as f64
            / sessions.len().max(1) as f64;

        (current_uptime_ms as f64 / 1000.0, sessions.len(), avg_session_ms / 1000.0, uptime_pct)
    }
}

struct State {
    restarts: RestartTracker,
    uptime: UptimeTracker,
}

/// Derives restart-loop and uptime metrics from lifecycle events and writes
/// them to the time-series store (§4.9).
pub struct LifecycleManager {
    state: Mutex<State>,
    store: std::sync::Arc<dyn crate::services::timeseries_store::TimeSeriesStore>,
}

impl LifecycleManager {
    pub fn new(
        store: std::sync::Arc<dyn crate::services::timeseries_store::TimeSeriesStore>,
        analysis_window_ms: i64,
        tracking_window_ms: i64,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                restarts: RestartTracker::new(analysis_window_ms),
                uptime: UptimeTracker::new(tracking_window_ms),
            }),
            store,
        }
    }

    fn labeled(name: &str, value: f64, container_id: &str, now_ms: i64) -> MetricSample {
        MetricSample::new(name, SampleValue::Number(value), now_ms).with_label("container_id", container_id)
    }

    async fn derive_and_store(&self, container_id: &str, now_ms: i64) {
        let samples = {
            let state = self.state.lock().unwrap();
            let (restart_count, is_loop, rate_per_hour) = state.restarts.stats(container_id, now_ms);
            let (uptime_seconds, _session_count, _avg_session_secs, uptime_pct) = state.uptime.stats(container_id, now_ms);
            let severity = restart_severity(restart_count, is_loop);

            vec![
                Self::labeled("container_uptime_seconds", uptime_seconds, container_id, now_ms),
                Self::labeled("container_restarts_total", state.restarts.total(container_id) as f64, container_id, now_ms),
                Self::labeled("container_is_restart_loop", if is_loop { 1.0 } else { 0.0 }, container_id, now_ms)
                    .with_label("severity", severity),
                Self::labeled("container_restart_rate_per_hour", rate_per_hour, container_id, now_ms),
                Self::labeled("container_uptime_percentage", uptime_pct, container_id, now_ms),
            ]
        };
        if let Err(err) = self.store.store(samples).await {
            warn!(container_id, error = %err, "failed to persist lifecycle-derived samples");
        }
    }

    /// Availability grade for a container's current uptime percentage.
    pub fn availability_grade(&self, container_id: &str, now_ms: i64) -> AvailabilityGrade {
        let state = self.state.lock().unwrap();
        let (_, _, _, pct) = state.uptime.stats(container_id, now_ms);
        AvailabilityGrade::from_percentage(pct)
    }

    pub fn is_running(&self, container_id: &str) -> bool {
        self.state.lock().unwrap().uptime.is_running(container_id)
    }
}

#[async_trait]
impl EventHandler for LifecycleManager {
    async fn handle(&self, event: &Event) -> Result<(), CoreError> {
        let EventPayload::Lifecycle(lifecycle) = &event.payload else {
            return Ok(());
        };
        let now_ms = lifecycle.timestamp_ms;
        {
            let mut state = self.state.lock().unwrap();
            match lifecycle.action {
                LifecycleAction::Start | LifecycleAction::Unpause => state.uptime.start(&lifecycle.container_id, now_ms),
                LifecycleAction::Stop | LifecycleAction::Die | LifecycleAction::Kill | LifecycleAction::Pause | LifecycleAction::Destroy => {
                    state.uptime.stop(&lifecycle.container_id, now_ms)
                }
                LifecycleAction::Restart => {
                    state.uptime.stop(&lifecycle.container_id, now_ms);
                    state.uptime.start(&lifecycle.container_id, now_ms);
                    state.restarts.record(&lifecycle.container_id, now_ms);
                }
                LifecycleAction::Create | LifecycleAction::HealthStatus => {}
            }
        }
        self.derive_and_store(&lifecycle.container_id, now_ms).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::{EventSeverity, LifecycleEvent};
    use crate::services::timeseries_store::InMemoryStore;
    use std::sync::Arc;

    fn lifecycle_event(action: LifecycleAction, container_id: &str, ts: i64) -> Event {
        Event {
            id: format!("e-{ts}"),
            timestamp_ms: ts,
            source: "runtime".to_string(),
            severity: EventSeverity::Info,
            labels: HashMap::new(),
            payload: EventPayload::Lifecycle(LifecycleEvent {
                container_id: container_id.to_string(),
                container_name: "/app".to_string(),
                image: "app:latest".to_string(),
                action,
                timestamp_ms: ts,
                exit_code: None,
                signal: None,
            }),
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn four_restarts_under_a_minute_apart_flags_a_restart_loop() {
        let store: Arc<dyn crate::services::timeseries_store::TimeSeriesStore> = Arc::new(InMemoryStore::default());
        let manager = LifecycleManager::new(Arc::clone(&store), 3_600_000, 3_600_000);

        for i in 0..4 {
            let ts = i * 30_000;
            manager.handle(&lifecycle_event(LifecycleAction::Restart, "c1", ts)).await.unwrap();
        }

        let samples = store.query(Some("container_is_restart_loop"), None, None, None, None, None).await;
        let last = samples.last().unwrap();
        assert_eq!(last.value, SampleValue::Number(1.0));
        assert_eq!(last.labels.get("severity").map(String::as_str), Some("critical"));
    }

    #[tokio::test]
    async fn a_single_restart_escalates_only_to_warning() {
        let store: Arc<dyn crate::services::timeseries_store::TimeSeriesStore> = Arc::new(InMemoryStore::default());
        let manager = LifecycleManager::new(Arc::clone(&store), 3_600_000, 3_600_000);

        manager.handle(&lifecycle_event(LifecycleAction::Restart, "c1", 0)).await.unwrap();
        manager.handle(&lifecycle_event(LifecycleAction::Restart, "c1", 100_000)).await.unwrap();

        let samples = store.query(Some("container_is_restart_loop"), None, None, None, None, None).await;
        let last = samples.last().unwrap();
        assert_eq!(last.value, SampleValue::Number(0.0));
        assert_eq!(last.labels.get("severity").map(String::as_str), Some("warning"));
    }

    #[tokio::test]
    async fn uptime_percentage_reflects_a_fully_running_session() {
        let store: Arc<dyn crate::services::timeseries_store::TimeSeriesStore> = Arc::new(InMemoryStore::default());
        let manager = LifecycleManager::new(Arc::clone(&store), 3_600_000, 1_000_000);

        manager.handle(&lifecycle_event(LifecycleAction::Start, "c1", 0)).await.unwrap();
        manager.handle(&lifecycle_event(LifecycleAction::HealthStatus, "c1", 1_000_000)).await.unwrap();

        assert!(manager.is_running("c1"));
        assert_eq!(manager.availability_grade("c1", 1_000_000), AvailabilityGrade::Excellent);
    }
}

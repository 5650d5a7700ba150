//! Hook dispatcher (C7, §4.3): resolves, orders, and runs the hooks
//! triggered by one event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::event::Event;
use crate::domain::models::hook::{ExecutionRecord, Hook, HookContext, HookResult};
use crate::services::hook_registry::HookRegistry;

#[derive(Debug, Clone, Default)]
pub struct HookStats {
    pub runs: u64,
    pub failures: u64,
    pub min_execution_time_ms: u64,
    pub max_execution_time_ms: u64,
    pub total_execution_time_ms: u64,
}

impl HookStats {
    pub fn avg_execution_time_ms(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.total_execution_time_ms as f64 / self.runs as f64
        }
    }

    fn record(&mut self, result: &HookResult) {
        self.runs += 1;
        if !result.success {
            self.failures += 1;
        }
        let ms = result.execution_time_ms;
        self.total_execution_time_ms += ms;
        self.max_execution_time_ms = self.max_execution_time_ms.max(ms);
        self.min_execution_time_ms = if self.runs == 1 {
            ms
        } else {
            self.min_execution_time_ms.min(ms)
        };
    }
}

#[derive(Default)]
struct State {
    stats: HashMap<String, HookStats>,
    currently_executing: std::collections::HashSet<String>,
}

/// Dispatches one event to its matching hooks under a global concurrency cap
/// (§4.3, §5). A failing or timed-out hook never short-circuits the rest.
pub struct HookDispatcher {
    registry: Arc<HookRegistry>,
    semaphore: Arc<Semaphore>,
    state: RwLock<State>,
}

impl HookDispatcher {
    pub fn new(registry: Arc<HookRegistry>, max_concurrent_hooks: usize) -> Self {
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(max_concurrent_hooks.max(1))),
            state: RwLock::new(State::default()),
        }
    }

    /// Runs every hook registered for `event`'s kind, in execution order,
    /// returning one result per hook that was actually attempted (hooks whose
    /// `should_execute` declines, or that panic doing so, are skipped and
    /// produce no result).
    pub async fn dispatch(&self, event: Event) -> Vec<HookResult> {
        let kind = event.kind_name().to_string();
        let candidates = self.registry.for_event(&kind).await;
        let candidate_ids: Vec<String> = candidates.iter().map(|hook| hook.id().to_string()).collect();
        let order = self.registry.execution_order(&candidate_ids).await;

        let by_id: HashMap<String, Arc<dyn Hook>> = candidates
            .into_iter()
            .map(|hook| (hook.id().to_string(), hook))
            .collect();

        let execution_id = Uuid::new_v4().to_string();
        let mut ctx = HookContext::new(event, execution_id, chrono::Utc::now().timestamp_millis());
        let mut results = Vec::new();

        for hook_id in order {
            let Some(hook) = by_id.get(&hook_id) else {
                continue;
            };
            if !hook.enabled() {
                continue;
            }

            let should_run = std::panic::AssertUnwindSafe(hook.should_execute(&ctx))
                .catch_unwind()
                .await;
            let should_run = match should_run {
                Ok(flag) => flag,
                Err(_) => {
                    warn!(hook_id = %hook_id, "should_execute panicked; skipping hook");
                    continue;
                }
            };
            if !should_run {
                continue;
            }

            let acquire_start = Instant::now();
            let permit = match tokio::time::timeout(hook.timeout(), self.semaphore.clone().acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => continue,
                Err(_) => {
                    let elapsed_ms = acquire_start.elapsed().as_millis() as u64;
                    let result = HookResult::timeout(hook.timeout(), elapsed_ms);
                    self.state
                        .write()
                        .await
                        .stats
                        .entry(hook_id.clone())
                        .or_default()
                        .record(&result);
                    ctx = ctx.with_record(ExecutionRecord {
                        hook_id: hook_id.clone(),
                        result: result.clone(),
                    });
                    results.push(result);
                    continue;
                }
            };
            self.state.write().await.currently_executing.insert(hook_id.clone());

            let start = Instant::now();
            let outcome = tokio::time::timeout(hook.timeout(), hook.execute(&ctx)).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            drop(permit);
            self.state.write().await.currently_executing.remove(&hook_id);

            let result = match outcome {
                Ok(result) => result,
                Err(_) => HookResult::timeout(hook.timeout(), elapsed_ms),
            };

            self.state
                .write()
                .await
                .stats
                .entry(hook_id.clone())
                .or_default()
                .record(&result);

            ctx = ctx.with_record(ExecutionRecord {
                hook_id: hook_id.clone(),
                result: result.clone(),
            });
            results.push(result);
        }

        results
    }

    pub async fn stats_for(&self, hook_id: &str) -> Option<HookStats> {
        self.state.read().await.stats.get(hook_id).cloned()
    }

    pub async fn currently_executing(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .currently_executing
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::{EventPayload, EventSeverity, FileEvent, FileOperation};
    use crate::domain::models::hook::{HookErrorKind, Priority};
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct RecordingHook {
        id: &'static str,
        priority: Priority,
        sleep: Option<Duration>,
        timeout: Duration,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Hook for RecordingHook {
        fn id(&self) -> &str {
            self.id
        }
        fn name(&self) -> &str {
            self.id
        }
        fn priority(&self) -> Priority {
            self.priority
        }
        fn triggers(&self) -> HashSet<String> {
            ["file".to_string()].into_iter().collect()
        }
        fn timeout(&self) -> Duration {
            self.timeout
        }
        async fn should_execute(&self, _ctx: &HookContext) -> bool {
            true
        }
        async fn execute(&self, _ctx: &HookContext) -> HookResult {
            if let Some(sleep) = self.sleep {
                tokio::time::sleep(sleep).await;
            }
            self.log.lock().await.push(self.id.to_string());
            HookResult::success("ok", 0)
        }
    }

    fn file_event() -> Event {
        Event::new(
            "e1",
            0,
            "watcher",
            EventSeverity::Info,
            EventPayload::File(FileEvent::new(FileOperation::Save, "a.rs", None)),
        )
    }

    #[tokio::test]
    async fn dispatch_orders_by_topology_then_priority() {
        let registry = Arc::new(HookRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(Arc::new(RecordingHook {
                id: "a",
                priority: Priority::Normal,
                sleep: None,
                timeout: Duration::from_secs(1),
                log: Arc::clone(&log),
            }))
            .await
            .unwrap();
        registry
            .register(Arc::new(RecordingHook {
                id: "b",
                priority: Priority::Low,
                sleep: None,
                timeout: Duration::from_secs(1),
                log: Arc::clone(&log),
            }))
            .await
            .unwrap();
        registry
            .register(Arc::new(RecordingHook {
                id: "c",
                priority: Priority::Critical,
                sleep: None,
                timeout: Duration::from_secs(1),
                log: Arc::clone(&log),
            }))
            .await
            .unwrap();
        registry.add_dep("a", "b").await.unwrap();

        let dispatcher = HookDispatcher::new(Arc::clone(&registry), 5);
        let results = dispatcher.dispatch(file_event()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(*log.lock().await, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn dispatch_reports_timeout_while_waiting_for_a_permit() {
        let registry = Arc::new(HookRegistry::new());
        registry
            .register(Arc::new(RecordingHook {
                id: "holder",
                priority: Priority::Critical,
                sleep: Some(Duration::from_millis(200)),
                timeout: Duration::from_secs(1),
                log: Arc::new(Mutex::new(Vec::new())),
            }))
            .await
            .unwrap();
        registry
            .register(Arc::new(RecordingHook {
                id: "waiter",
                priority: Priority::Normal,
                sleep: None,
                timeout: Duration::from_millis(20),
                log: Arc::new(Mutex::new(Vec::new())),
            }))
            .await
            .unwrap();

        let dispatcher = HookDispatcher::new(registry, 1);
        let results = dispatcher.dispatch(file_event()).await;
        assert_eq!(results.len(), 2);
        let waiter_result = results.iter().find(|r| !r.success).expect("waiter should have timed out");
        assert_eq!(waiter_result.error, Some(HookErrorKind::Timeout));
    }

    #[tokio::test]
    async fn dispatch_reports_timeout_with_suggestion() {
        let registry = Arc::new(HookRegistry::new());
        registry
            .register(Arc::new(RecordingHook {
                id: "slow",
                priority: Priority::Normal,
                sleep: Some(Duration::from_millis(300)),
                timeout: Duration::from_millis(50),
                log: Arc::new(Mutex::new(Vec::new())),
            }))
            .await
            .unwrap();

        let dispatcher = HookDispatcher::new(registry, 5);
        let results = dispatcher.dispatch(file_event()).await;
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(!result.success);
        assert_eq!(result.error, Some(HookErrorKind::Timeout));
        assert!(result.execution_time_ms >= 50);
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.contains("Increase the hook timeout")));
    }
}

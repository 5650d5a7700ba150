//! Hook registry (C6, §4.2): ownership, lookup, and the dependency DAG over
//! registered hooks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::errors::RegistryError;
use crate::domain::models::dag::HookDag;
use crate::domain::models::hook::{Hook, Priority};

struct Entry {
    hook: Arc<dyn Hook>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    dag: HookDag,
    /// Secondary index: event kind -> hook ids triggered by it.
    by_kind: HashMap<String, Vec<String>>,
    /// Secondary index: priority -> hook ids at that priority.
    by_priority: HashMap<Priority, Vec<String>>,
}

/// Owns the set of registered hooks and their dependency DAG (§4.2).
///
/// Reader-visible state is a consistent snapshot: mutations (`register`,
/// `unregister`, `add_dep`, `remove_dep`) are serialized under a single write
/// lock, while lookups (`get`, `for_event`, `by_priority`, `all`) take a read
/// lock and never observe a partially-applied mutation.
pub struct HookRegistry {
    state: RwLock<State>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    pub async fn register(&self, hook: Arc<dyn Hook>) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let id = hook.id().to_string();
        if state.entries.contains_key(&id) {
            return Err(RegistryError::DuplicateId);
        }
        state.dag.add_node(id.clone());
        for kind in hook.triggers() {
            state.by_kind.entry(kind).or_default().push(id.clone());
        }
        state
            .by_priority
            .entry(hook.priority())
            .or_default()
            .push(id.clone());
        state.entries.insert(id, Entry { hook });
        Ok(())
    }

    /// Idempotent: unregistering an unknown id is a no-op. Returns whether a
    /// hook was actually removed.
    pub async fn unregister(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        if state.entries.remove(id).is_none() {
            return false;
        }
        state.dag.remove_node(id);
        for ids in state.by_kind.values_mut() {
            ids.retain(|existing| existing != id);
        }
        for ids in state.by_priority.values_mut() {
            ids.retain(|existing| existing != id);
        }
        true
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn Hook>> {
        self.state
            .read()
            .await
            .entries
            .get(id)
            .map(|entry| Arc::clone(&entry.hook))
    }

    /// Hooks registered for an event kind, in a stable but otherwise
    /// unspecified order (ordering is imposed later by `execution_order`).
    pub async fn for_event(&self, kind_name: &str) -> Vec<Arc<dyn Hook>> {
        let state = self.state.read().await;
        state
            .by_kind
            .get(kind_name)
            .into_iter()
            .flatten()
            .filter_map(|id| state.entries.get(id).map(|e| Arc::clone(&e.hook)))
            .collect()
    }

    pub async fn by_priority(&self, priority: Priority) -> Vec<Arc<dyn Hook>> {
        let state = self.state.read().await;
        state
            .by_priority
            .get(&priority)
            .into_iter()
            .flatten()
            .filter_map(|id| state.entries.get(id).map(|e| Arc::clone(&e.hook)))
            .collect()
    }

    pub async fn all(&self) -> Vec<Arc<dyn Hook>> {
        self.state
            .read()
            .await
            .entries
            .values()
            .map(|entry| Arc::clone(&entry.hook))
            .collect()
    }

    /// `hook_id` depends on `dep_id`: `dep_id` must execute first. Rejects the
    /// edge, leaving the DAG unchanged, if it would close a cycle (§4.2,
    /// testable scenario 1).
    pub async fn add_dep(&self, hook_id: &str, dep_id: &str) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        state.dag.add_dep(hook_id, dep_id).map_err(RegistryError::from)
    }

    pub async fn remove_dep(&self, hook_id: &str, dep_id: &str) {
        self.state.write().await.dag.remove_dep(hook_id, dep_id);
    }

    pub async fn deps(&self, hook_id: &str) -> Vec<String> {
        self.state.read().await.dag.deps(hook_id)
    }

    pub async fn dependents(&self, hook_id: &str) -> Vec<String> {
        self.state.read().await.dag.dependents(hook_id)
    }

    /// Topological order over `candidate_ids`, breaking ties by ascending
    /// priority (§4.3, testable scenario 2). Edges to hooks outside the
    /// candidate subset are ignored, matching the dispatcher's use of this
    /// over only the hooks triggered by one event.
    pub async fn execution_order(&self, candidate_ids: &[String]) -> Vec<String> {
        let state = self.state.read().await;
        let candidates: std::collections::HashSet<&str> =
            candidate_ids.iter().map(String::as_str).collect();

        let mut sub_dag = HookDag::new();
        for id in candidate_ids {
            sub_dag.add_node(id.clone());
        }
        for id in candidate_ids {
            for dep in state.dag.deps(id) {
                if candidates.contains(dep.as_str()) {
                    let _ = sub_dag.add_dep(id, &dep);
                }
            }
        }

        let priority_of = |id: &str| {
            state
                .entries
                .get(id)
                .map(|entry| entry.hook.priority() as i32)
                .unwrap_or(i32::MAX)
        };
        sub_dag.execution_order(priority_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::hook::{HookContext, HookResult};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::Duration;

    struct StubHook {
        id: String,
        priority: Priority,
        triggers: HashSet<String>,
    }

    #[async_trait]
    impl Hook for StubHook {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn priority(&self) -> Priority {
            self.priority
        }
        fn triggers(&self) -> HashSet<String> {
            self.triggers.clone()
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn should_execute(&self, _ctx: &HookContext) -> bool {
            true
        }
        async fn execute(&self, _ctx: &HookContext) -> HookResult {
            HookResult::success("ok", 0)
        }
    }

    fn stub(id: &str, priority: Priority) -> Arc<dyn Hook> {
        Arc::new(StubHook {
            id: id.to_string(),
            priority,
            triggers: ["file".to_string()].into_iter().collect(),
        })
    }

    #[tokio::test]
    async fn register_rejects_duplicate_ids() {
        let registry = HookRegistry::new();
        registry.register(stub("h1", Priority::Normal)).await.unwrap();
        let err = registry
            .register(stub("h1", Priority::Normal))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId);
    }

    #[tokio::test]
    async fn add_dep_rejecting_a_cycle_keeps_prior_edges() {
        let registry = HookRegistry::new();
        registry.register(stub("h1", Priority::Normal)).await.unwrap();
        registry.register(stub("h2", Priority::Normal)).await.unwrap();
        registry.register(stub("h3", Priority::Normal)).await.unwrap();

        registry.add_dep("h2", "h1").await.unwrap();
        registry.add_dep("h3", "h2").await.unwrap();

        let err = registry.add_dep("h1", "h3").await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::Dag(crate::domain::errors::DagError::CycleWouldForm)
        );
        assert_eq!(registry.deps("h2").await, vec!["h1".to_string()]);
        assert_eq!(registry.deps("h3").await, vec!["h2".to_string()]);
        assert!(registry.deps("h1").await.is_empty());
    }

    #[tokio::test]
    async fn execution_order_places_critical_first_when_unconstrained() {
        let registry = HookRegistry::new();
        registry.register(stub("a", Priority::Normal)).await.unwrap();
        registry.register(stub("b", Priority::Low)).await.unwrap();
        registry.register(stub("c", Priority::Critical)).await.unwrap();
        registry.add_dep("a", "b").await.unwrap();

        let order = registry
            .execution_order(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await;
        assert_eq!(
            order,
            vec!["c".to_string(), "b".to_string(), "a".to_string()]
        );
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = HookRegistry::new();
        assert!(!registry.unregister("missing").await);
        registry.register(stub("h1", Priority::Normal)).await.unwrap();
        assert!(registry.unregister("h1").await);
        assert!(!registry.unregister("h1").await);
        assert!(registry.get("h1").await.is_none());
    }
}

//! Dependency DAG over hook ids (C6, §4.2).
//!
//! Edges are directed "depends on" relations: `add_dep(a, b)` means `a`
//! must run after `b`. Cycle rejection checks the transitive closure of
//! `b`'s own dependencies before the edge is added, so a rejected edge
//! never mutates the graph (testable scenario 1).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::domain::errors::DagError;

#[derive(Debug, Clone, Default)]
pub struct HookDag {
    /// hook id -> set of hook ids it depends on (must run before it).
    deps: HashMap<String, BTreeSet<String>>,
    /// hook id -> set of hook ids that depend on it.
    dependents: HashMap<String, BTreeSet<String>>,
}

impl HookDag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.deps.entry(id.clone()).or_default();
        self.dependents.entry(id).or_default();
    }

    pub fn remove_node(&mut self, id: &str) {
        if let Some(deps) = self.deps.remove(id) {
            for dep in deps {
                if let Some(set) = self.dependents.get_mut(&dep) {
                    set.remove(id);
                }
            }
        }
        if let Some(dependents) = self.dependents.remove(id) {
            for dependent in dependents {
                if let Some(set) = self.deps.get_mut(&dependent) {
                    set.remove(id);
                }
            }
        }
    }

    /// Adds the edge `hook_id depends_on dep_id`. Rejects the edge, leaving
    /// the graph unchanged, if it would close a cycle.
    pub fn add_dep(&mut self, hook_id: &str, dep_id: &str) -> Result<(), DagError> {
        if !self.deps.contains_key(hook_id) {
            return Err(DagError::UnknownHook);
        }
        if !self.deps.contains_key(dep_id) {
            return Err(DagError::UnknownHook);
        }
        if hook_id == dep_id || self.reaches(dep_id, hook_id) {
            return Err(DagError::CycleWouldForm);
        }
        self.deps.get_mut(hook_id).unwrap().insert(dep_id.to_string());
        self.dependents
            .get_mut(dep_id)
            .unwrap()
            .insert(hook_id.to_string());
        Ok(())
    }

    pub fn remove_dep(&mut self, hook_id: &str, dep_id: &str) {
        if let Some(set) = self.deps.get_mut(hook_id) {
            set.remove(dep_id);
        }
        if let Some(set) = self.dependents.get_mut(dep_id) {
            set.remove(hook_id);
        }
    }

    pub fn deps(&self, hook_id: &str) -> Vec<String> {
        self.deps
            .get(hook_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependents(&self, hook_id: &str) -> Vec<String> {
        self.dependents
            .get(hook_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True if `from` can reach `to` by following dependency edges
    /// (`from` depends, directly or transitively, on `to`).
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from.to_string());
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(deps) = self.deps.get(&current) {
                queue.extend(deps.iter().cloned());
            }
        }
        false
    }

    /// Topological order over all registered hook ids, breaking ties among
    /// concurrently-ready hooks by ascending priority (lower value first).
    /// Falls back to plain priority-ascending order if a cycle is somehow
    /// present (§4.3 dispatch fallback).
    pub fn execution_order<F>(&self, priority_of: F) -> Vec<String>
    where
        F: Fn(&str) -> i32,
    {
        let mut in_degree: HashMap<String, usize> = self
            .deps
            .iter()
            .map(|(id, deps)| (id.clone(), deps.len()))
            .collect();

        let mut ready: Vec<String> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while !ready.is_empty() {
            ready.sort_by(|a, b| {
                priority_of(a)
                    .cmp(&priority_of(b))
                    .then_with(|| a.cmp(b))
            });
            let current = ready.remove(0);
            order.push(current.clone());
            if let Some(dependents) = self.dependents.get(&current) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push(dependent.clone());
                        }
                    }
                }
            }
        }

        if order.len() != self.deps.len() {
            let mut remaining: Vec<String> = self
                .deps
                .keys()
                .filter(|id| !order.contains(id))
                .cloned()
                .collect();
            remaining.sort_by(|a, b| priority_of(a).cmp(&priority_of(b)).then_with(|| a.cmp(b)));
            order.extend(remaining);
        }

        order
    }

    pub fn has_cycle(&self) -> bool {
        self.deps.keys().any(|id| self.reaches(id, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag_with_nodes(ids: &[&str]) -> HookDag {
        let mut dag = HookDag::new();
        for id in ids {
            dag.add_node(*id);
        }
        dag
    }

    #[test]
    fn rejects_edge_that_would_close_a_cycle() {
        let mut dag = dag_with_nodes(&["h1", "h2", "h3"]);
        dag.add_dep("h2", "h1").unwrap();
        dag.add_dep("h3", "h2").unwrap();

        let err = dag.add_dep("h1", "h3").unwrap_err();
        assert_eq!(err, DagError::CycleWouldForm);
        assert_eq!(dag.deps("h2"), vec!["h1".to_string()]);
        assert_eq!(dag.deps("h3"), vec!["h2".to_string()]);
        assert!(dag.deps("h1").is_empty());
    }

    #[test]
    fn execution_order_respects_topology_then_priority() {
        // A (Normal=2) depends on B (Low=3); C (Critical=0) has no deps.
        let mut dag = dag_with_nodes(&["a", "b", "c"]);
        dag.add_dep("a", "b").unwrap();
        let priority = |id: &str| match id {
            "a" => 2,
            "b" => 3,
            "c" => 0,
            _ => unreachable!(),
        };
        let order = dag.execution_order(priority);
        assert_eq!(order, vec!["c".to_string(), "b".to_string(), "a".to_string()]);
    }

    #[test]
    fn removing_a_node_clears_both_edge_directions() {
        let mut dag = dag_with_nodes(&["a", "b"]);
        dag.add_dep("a", "b").unwrap();
        dag.remove_node("b");
        assert!(dag.deps("a").is_empty());
        assert!(!dag.has_cycle());
    }
}

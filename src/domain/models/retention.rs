//! Retention rule model (C3, §3/§4.6).

use std::collections::HashMap;
use std::time::Duration;

/// A pattern/priority entry declaring how long a class of samples is kept.
#[derive(Debug, Clone)]
pub struct RetentionRule {
    /// Glob pattern over the metric name, e.g. `cpu_*`.
    pub pattern: String,
    pub label_filters: HashMap<String, String>,
    pub retention: Duration,
    /// Higher wins on pattern-match tie; same-priority ties break toward the
    /// longest non-wildcard pattern prefix (§11 of the expanded spec).
    pub priority: i32,
    /// Minimum number of points to keep for a matching series even if all
    /// are older than the cutoff.
    pub min_points_to_keep: usize,
}

impl RetentionRule {
    pub fn new(pattern: impl Into<String>, retention: Duration, priority: i32) -> Self {
        Self {
            pattern: pattern.into(),
            label_filters: HashMap::new(),
            retention,
            priority,
            min_points_to_keep: 0,
        }
    }

    /// Length of the pattern's literal (non-wildcard) prefix, used to break
    /// same-priority ties toward the most specific rule.
    pub fn specificity(&self) -> usize {
        self.pattern.find(['*', '?', '[']).unwrap_or(self.pattern.len())
    }

    pub fn matches_name(&self, name: &str) -> bool {
        glob::Pattern::new(&self.pattern)
            .map(|p| p.matches(name))
            .unwrap_or(false)
    }

    pub fn matches_labels(&self, labels: &HashMap<String, String>) -> bool {
        self.label_filters
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_pattern_matches_prefix_family() {
        let rule = RetentionRule::new("cpu_*", Duration::from_secs(900), 0);
        assert!(rule.matches_name("cpu_usage"));
        assert!(!rule.matches_name("memory_usage"));
    }

    #[test]
    fn specificity_is_literal_prefix_length() {
        let narrow = RetentionRule::new("cpu_usage_percent", Duration::from_secs(1), 0);
        let wide = RetentionRule::new("cpu_*", Duration::from_secs(1), 0);
        assert!(narrow.specificity() > wide.specificity());
    }
}

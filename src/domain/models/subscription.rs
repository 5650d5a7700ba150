//! Subscription model for the event bus (C5, §3/§4.1).
//!
//! Grounded on the teacher's `event_reactor.rs` `EventFilter`/`HandlerPriority`
//! shape, adapted from broadcast-replay semantics to the bounded-queue model.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::event::{Event, EventSeverity};

/// A conjunction of clauses over envelope fields and payload labels.
/// A subscription matches an event iff every present clause holds.
#[derive(Clone, Default)]
pub struct EventFilter {
    pub min_severity: Option<EventSeverity>,
    pub source: Option<String>,
    /// Required label-equality clauses against the event's envelope labels.
    pub label_equals: Vec<(String, String)>,
    pub custom_predicate: Option<Arc<dyn Fn(&Event) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFilter")
            .field("min_severity", &self.min_severity)
            .field("source", &self.source)
            .field("label_equals", &self.label_equals)
            .field("custom_predicate", &self.custom_predicate.is_some())
            .finish()
    }
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(min) = self.min_severity {
            if event.severity < min {
                return false;
            }
        }
        if let Some(ref source) = self.source {
            if &event.source != source {
                return false;
            }
        }
        if !self
            .label_equals
            .iter()
            .all(|(k, v)| event.labels.get(k) == Some(v))
        {
            return false;
        }
        if let Some(ref predicate) = self.custom_predicate {
            if !predicate(event) {
                return false;
            }
        }
        true
    }
}

/// A registered intent to receive events matching a filter (§3).
pub struct Subscription {
    pub id: u64,
    /// Empty means "all kinds".
    pub kinds: HashSet<String>,
    pub filter: EventFilter,
    /// Higher dispatches first.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn matches(&self, event: &Event) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(event.kind_name())) && self.filter.matches(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::{EventPayload, FileEvent, FileOperation};

    fn test_event(severity: EventSeverity) -> Event {
        Event::new(
            "e1",
            0,
            "watcher",
            severity,
            EventPayload::File(FileEvent::new(FileOperation::Save, "a.rs", None)),
        )
    }

    #[test]
    fn severity_filter_rejects_below_minimum() {
        let filter = EventFilter {
            min_severity: Some(EventSeverity::High),
            ..Default::default()
        };
        assert!(!filter.matches(&test_event(EventSeverity::Medium)));
        assert!(filter.matches(&test_event(EventSeverity::Critical)));
    }

    #[test]
    fn empty_kind_set_matches_everything() {
        let sub = Subscription {
            id: 1,
            kinds: HashSet::new(),
            filter: EventFilter::default(),
            priority: 0,
            created_at: Utc::now(),
        };
        assert!(sub.matches(&test_event(EventSeverity::Info)));
    }

    #[test]
    fn kind_set_restricts_to_named_kinds() {
        let mut kinds = HashSet::new();
        kinds.insert("git".to_string());
        let sub = Subscription {
            id: 1,
            kinds,
            filter: EventFilter::default(),
            priority: 0,
            created_at: Utc::now(),
        };
        assert!(!sub.matches(&test_event(EventSeverity::Info)));
    }
}

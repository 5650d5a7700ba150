//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod alert;
pub mod collector;
pub mod config;
pub mod dag;
pub mod event;
pub mod hook;
pub mod retention;
pub mod sample;
pub mod subscription;

pub use alert::{Alert, AlertCondition, AlertRule, AlertStatus, NotificationAttempt, RuleLogic};
pub use collector::{Collector, CollectorStatus};
pub use config::{
    AlertsConfig, ChannelConfig, CollectorConfig, Config, GlobalConfig, NotificationsConfig,
    PrometheusConfig, RetentionConfig, RetentionRuleConfig, RoutingRuleConfig, RuntimeConfig,
    StorageConfig,
};
pub use dag::HookDag;
pub use event::{
    BuildEvent, Comparator, DependencyEvent, Event, EventPayload, EventSeverity, FileEvent,
    FileOperation, GitEvent, LifecycleAction, LifecycleEvent, MetricThresholdEvent, SystemEvent,
    ThresholdDescriptor,
};
pub use hook::{
    ExecutionRecord, Hook, HookContext, HookErrorKind, HookResult, Priority, ProjectState,
    ResourceRequirements, SystemMetricsSnapshot, UserPreferences,
};
pub use retention::RetentionRule;
pub use sample::{Aggregation, MetricSample, SampleValue, SeriesFingerprint};
pub use subscription::{EventFilter, Subscription};

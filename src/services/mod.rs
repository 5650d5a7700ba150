//! Application services: concrete implementations of the domain-layer
//! capability interfaces, plus the orchestrators that wire them together.

pub mod alert_engine;
pub mod collectors;
pub mod event_bus;
pub mod hook_dispatcher;
pub mod hook_registry;
pub mod lifecycle_manager;
pub mod notification_router;
pub mod retention_engine;
pub mod scrape_formatter;
pub mod timeseries_store;

pub use alert_engine::{AlertManager, EvalOutcome};
pub use collectors::{CollectorRegistry, CpuCollector, DiskCollector, LifecycleCollector, MemoryCollector, NetworkCollector, RuntimeProbe};
pub use event_bus::{EventBus, EventBusConfig, EventBusStats, EventHandler};
pub use hook_dispatcher::HookDispatcher;
pub use hook_registry::HookRegistry;
pub use lifecycle_manager::{AvailabilityGrade, LifecycleManager};
pub use notification_router::{channel_from_config, EmailChannel, LogChannel, NotificationChannel, NotificationRouter, SlackChannel, WebhookChannel};
pub use retention_engine::{ApplyReport, RetentionEngine};
pub use scrape_formatter::{MetricType, ScrapeFormatter};
pub use timeseries_store::{FileBackedStore, InMemoryStore, RangePoint, StoreStats, TimeSeriesStore};

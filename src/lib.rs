//! Agentwatch - agent-hook automation and container observability platform
//!
//! Watches a fleet of local containers and related development signals,
//! turns those signals into typed events, and dispatches user-defined hooks
//! against them under priority/dependency/concurrency/timeout discipline.
//! Collected metrics flow through a retention-bounded time-series store,
//! an alert rule engine, a notification router, and a Prometheus-style
//! scrape formatter.

pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::config::Config;
pub use domain::{BusError, CoreError, CoreResult, DagError, RegistryError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::logging::LoggerImpl;

//! Domain layer for the agent-hook automation and observability platform.
//!
//! This module contains core business logic and domain models, free of
//! infrastructure concerns (I/O, process boundaries, wire formats).

pub mod errors;
pub mod models;

pub use errors::{BusError, CoreError, CoreResult, DagError, RegistryError};

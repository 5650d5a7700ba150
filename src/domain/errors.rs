//! Core error taxonomy for the agent-hook automation and observability platform.
//!
//! Mirrors the error kinds a caller actually needs to branch on: whether an
//! error is fatal at startup, worth retrying, or purely informational.

use thiserror::Error;

/// Top-level error kind for the platform core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid/missing config fields, unknown enum values, invalid patterns. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A hook's own logic failed or raised. Captured in `HookResult`, never fatal.
    #[error("execution error: {0}")]
    Execution(String),

    /// Queue/memory capacity exhausted, semaphore starvation. Typically transient.
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// An operation exceeded its deadline.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// A missing or unhealthy collaborator (runtime not present, store unreachable).
    #[error("dependency unavailable: {0}")]
    Dependency(String),

    /// OS-level access denied.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Transport failure on a notification channel.
    #[error("network error: {0}")]
    Network(String),

    /// Catch-all, original message preserved, never masked.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CoreError {
    /// Errors a caller may retry with backoff; `Configuration` and `Unknown` are not.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Resource(_) | Self::Timeout(_) | Self::Dependency(_) | Self::Network(_)
        )
    }

    /// Errors that should halt startup rather than degrade a single subsystem.
    pub const fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unknown(err.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::Permission(err.to_string()),
            std::io::ErrorKind::TimedOut => Self::Timeout(0),
            _ => Self::Unknown(err.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors specific to the hook registry's dependency DAG (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("hook id not present in registry")]
    UnknownHook,
    #[error("adding this dependency would form a cycle")]
    CycleWouldForm,
    #[error("cycle detected among the requested subset")]
    CycleDetected,
}

/// Errors returned by the hook registry (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a hook with this id is already registered")]
    DuplicateId,
    #[error(transparent)]
    Dag(#[from] DagError),
}

/// Errors returned by the event bus (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("event queue is at capacity")]
    QueueFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_matches_taxonomy() {
        assert!(CoreError::Timeout(100).is_transient());
        assert!(CoreError::Resource("queue full".into()).is_transient());
        assert!(!CoreError::Configuration("bad field".into()).is_transient());
        assert!(!CoreError::Unknown("???".into()).is_transient());
    }

    #[test]
    fn configuration_errors_are_fatal_at_startup() {
        assert!(CoreError::Configuration("x".into()).is_fatal_at_startup());
        assert!(!CoreError::Network("x".into()).is_fatal_at_startup());
    }

    #[test]
    fn registry_error_wraps_dag_error() {
        let err: RegistryError = DagError::CycleWouldForm.into();
        assert!(matches!(err, RegistryError::Dag(DagError::CycleWouldForm)));
    }
}

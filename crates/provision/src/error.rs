//! Error types for provisioning runs.
//!
//! Errors are categorized so the executor can decide what to retry.
//! Structural errors (duplicates, unknown references, cycles, bad
//! configuration) abort a run before any remote action and are never
//! retried. Connectivity and action errors are transient and retried
//! according to the run's [`RetryPolicy`](crate::RetryPolicy).

use std::time::Duration;
use thiserror::Error;

/// Categories of provisioning errors for retry logic and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad topology or step declarations
    Configuration,
    /// Duplicate names, unknown references, dependency cycles
    Structural,
    /// Node unreachable or not ready in time (transient, retryable)
    Connectivity,
    /// Remote command exited non-zero (retryable)
    Action,
    /// Run was cancelled
    Cancelled,
    /// Local I/O or encoding failure
    Io,
}

impl ErrorCategory {
    /// Whether errors in this category are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity | Self::Action)
    }

    /// Whether errors in this category must abort before any work starts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration | Self::Structural)
    }
}

/// Errors that can occur while declaring or running a provisioning graph.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid topology or step declaration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A node with this name is already registered
    #[error("duplicate node: {name}")]
    DuplicateNode {
        /// Name that was registered twice
        name: String,
    },

    /// No node with this name is registered
    #[error("unknown node: {name}")]
    UnknownNode {
        /// Name that was looked up
        name: String,
    },

    /// A step with this name already exists in the graph
    #[error("duplicate step: {name}")]
    DuplicateStep {
        /// Name that was added twice
        name: String,
    },

    /// A step depends on a step that was never declared
    #[error("step '{referenced_by}' depends on unknown step '{name}'")]
    UnknownStep {
        /// Missing dependency
        name: String,
        /// Step declaring the dependency
        referenced_by: String,
    },

    /// Adding a step would close a dependency cycle
    #[error("dependency cycle: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// Step names along the cycle, first name repeated at the end
        cycle: Vec<String>,
    },

    /// Node could not be reached
    #[error("node '{node}' unreachable: {message}")]
    Connectivity {
        /// Node name
        node: String,
        /// What failed
        message: String,
    },

    /// Remote action failed
    #[error("action failed on '{node}'{}: {message}", exit_code.map(|c| format!(" (exit {c})")).unwrap_or_default())]
    Action {
        /// Node name
        node: String,
        /// Exit code of the remote command, if it ran
        exit_code: Option<i32>,
        /// Error output or description
        message: String,
    },

    /// Health probe did not succeed before the deadline
    #[error("node '{node}' not ready after {waited:?}: {capability}")]
    Timeout {
        /// Node name
        node: String,
        /// Capability that was awaited
        capability: String,
        /// How long the prober waited
        waited: Duration,
    },

    /// The run was cancelled
    #[error("run cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Configuration(_) => ErrorCategory::Configuration,
            Error::DuplicateNode { .. }
            | Error::UnknownNode { .. }
            | Error::DuplicateStep { .. }
            | Error::UnknownStep { .. }
            | Error::CyclicDependency { .. } => ErrorCategory::Structural,
            Error::Connectivity { .. } | Error::Timeout { .. } => ErrorCategory::Connectivity,
            Error::Action { .. } => ErrorCategory::Action,
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether the executor should retry after this error.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error aborts a run before any work.
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }

    /// Shorthand for an action error with a known exit code.
    pub fn action(node: &str, exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Error::Action {
            node: node.to_string(),
            exit_code,
            message: message.into(),
        }
    }

    /// Shorthand for a connectivity error.
    pub fn connectivity(node: &str, message: impl Into<String>) -> Self {
        Error::Connectivity {
            node: node.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

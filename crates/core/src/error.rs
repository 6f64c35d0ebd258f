//! Core error types for Eirenyx reconciliation.
//!
//! Errors are grouped by how the controllers react to them: terminal errors
//! wait for the user to edit the object, transient errors are retried after a
//! fixed delay.

use std::time::Duration;

use thiserror::Error;

/// Fixed backoff applied after a transient failure.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Backoff applied when garbage-collecting an orphaned report fails.
pub const ORPHAN_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Core error type for Eirenyx operations.
#[derive(Debug, Error)]
pub enum Error {
    // Terminal errors
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("unsupported type: {kind}")]
    UnsupportedType { kind: String },

    // Lookup errors
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("release '{release}' not found")]
    ReleaseNotFound { release: String },

    // Retryable errors
    #[error("conflict writing {kind} '{name}': {reason}")]
    Conflict {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("{operation} failed: {reason}")]
    Transient { operation: String, reason: String },

    #[error("not yet complete: {reason}")]
    NotReady { reason: String },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    // Wrapped errors
    #[error("Kubernetes API error: {0}")]
    Kube(kube::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(kind: impl Into<String>) -> Self {
        Self::UnsupportedType { kind: kind.into() }
    }

    /// Create a not found error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a release not found error.
    pub fn release_not_found(release: impl Into<String>) -> Self {
        Self::ReleaseNotFound {
            release: release.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a transient infrastructure error.
    pub fn transient(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-ready error.
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether the error requires a spec edit before anything can change.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::UnsupportedType { .. })
    }

    /// Whether the error reports a missing object.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ReleaseNotFound { .. })
    }

    /// Delay before the object should be reconciled again, `None` to wait for a change.
    pub const fn requeue_after(&self) -> Option<Duration> {
        if self.is_terminal() {
            None
        } else {
            Some(RETRY_DELAY)
        }
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => {
                Self::not_found(response.reason.clone(), response.message.clone())
            }
            kube::Error::Api(ref response) if response.code == 409 => {
                Self::conflict(response.reason.clone(), "", response.message.clone())
            }
            other => Self::Kube(other),
        }
    }
}

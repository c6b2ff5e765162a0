//! Error taxonomy for the distribution engine
//!
//! Conflicts and exclusions are ordinary outcomes and show up in reports.
//! Only the conditions below are raised to callers.

use thiserror::Error;
use vaultline_core::retry::RetryError;

use crate::remote::RemoteError;
use crate::types::QuotaCategory;

/// Result type alias using the engine's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    /// Network reset, timeout, 5xx or 429 that survived every retry
    #[error("remote call failed after {attempts} attempts: {message}")]
    RemoteTransient {
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    /// 4xx other than 429; never retried
    #[error("remote rejected request (HTTP {status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// Admission refused before any remote write was attempted
    #[error(
        "quota exhausted for {account}/{category}: {remaining} remaining, \
         {required} required with {reserve} reserved; resets in {minutes_until_reset} min"
    )]
    QuotaExhausted {
        account: String,
        category: QuotaCategory,
        remaining: u64,
        required: u64,
        reserve: u64,
        minutes_until_reset: i64,
    },

    /// The source value diverges from what the targets were last given
    #[error("value conflict for {secret}: {source_scope} differs from {}", .target_scopes.join(", "))]
    ValueConflict {
        secret: String,
        source_scope: String,
        target_scopes: Vec<String>,
    },

    /// The destination public key could not be fetched or used
    #[error("encryption unavailable for {destination}: {message}")]
    EncryptionUnavailable { destination: String, message: String },

    /// A provisioned environment references a resource that does not exist
    #[error("linked resource missing: {kind} '{id}'")]
    LinkedResourceMissing { kind: String, id: String },

    /// Local validation failure, raised without a remote round trip
    #[error("validation failed: {0}")]
    Validation(String),

    /// The caller's deadline passed before the next remote call or backoff
    #[error("deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u32 },

    /// Persistence failure
    #[error("store error: {0}")]
    Store(String),

    /// Audit sink failure
    #[error("audit sink error: {0}")]
    Audit(String),

    /// Configuration error from vaultline-core
    #[error(transparent)]
    Config(#[from] vaultline_core::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create an encryption unavailable error
    pub fn encryption_unavailable(
        destination: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::EncryptionUnavailable {
            destination: destination.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the surrounding operation rather than
    /// being recorded as a single failed target
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::QuotaExhausted { .. }
                | Error::EncryptionUnavailable { .. }
                | Error::DeadlineExceeded { .. }
                | Error::Store(_)
                | Error::Audit(_)
        )
    }

    /// HTTP status carried by a remote error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RemoteTransient { status, .. } => *status,
            Error::RemoteRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RetryError<RemoteError>> for Error {
    fn from(err: RetryError<RemoteError>) -> Self {
        match err {
            RetryError::NonRetryable(source) => Error::RemoteRejected {
                status: source.status.unwrap_or_default(),
                message: source.message,
            },
            RetryError::Exhausted {
                attempts, source, ..
            } => Error::RemoteTransient {
                status: source.status,
                attempts,
                message: source.message,
            },
            RetryError::Cancelled { attempts, .. } => Error::DeadlineExceeded { attempts },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retry_error_mapping() {
        let rejected: Error = RetryError::non_retryable(RemoteError::status(404, "Not Found")).into();
        assert!(matches!(rejected, Error::RemoteRejected { status: 404, .. }));

        let transient: Error = RetryError::exhausted(
            4,
            RemoteError::status(503, "Service Unavailable"),
            Duration::from_secs(7),
        )
        .into();
        assert!(matches!(
            transient,
            Error::RemoteTransient {
                status: Some(503),
                attempts: 4,
                ..
            }
        ));

        let cancelled: Error = RetryError::<RemoteError>::cancelled(2, None).into();
        assert!(matches!(cancelled, Error::DeadlineExceeded { attempts: 2 }));
    }

    #[test]
    fn test_conflict_names_both_scopes() {
        let err = Error::ValueConflict {
            secret: "API_KEY".to_string(),
            source_scope: "source".to_string(),
            target_scopes: vec!["actions".to_string(), "dependabot".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "value conflict for API_KEY: source differs from actions, dependabot"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::encryption_unavailable("acme/web:actions", "404").is_fatal());
        assert!(Error::DeadlineExceeded { attempts: 1 }.is_fatal());
        assert!(!Error::RemoteRejected {
            status: 422,
            message: "bad".to_string()
        }
        .is_fatal());
        assert!(!Error::validation("too many reviewers").is_fatal());
    }
}

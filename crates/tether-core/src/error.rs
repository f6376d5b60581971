//! Error types and result handling for webhook sync operations.
//!
//! Defines a coded error taxonomy so log lines can be correlated with the
//! HTTP status the ingress returned. Storage failures are reported through
//! `CoreError`, which the ingress folds into `TetherError::Persistence`.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for storage operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

/// Tether error taxonomy.
///
/// `E0xxx` are startup failures, `E1xxx` are rejected requests, `E2xxx` are
/// collaborator failures after the request was authenticated.
#[derive(Debug, Error)]
pub enum TetherError {
    /// Required configuration is absent or unusable (E0001).
    #[error("[E0001] Configuration error: {0}")]
    Configuration(String),

    /// One or more webhook headers were absent (E1001).
    #[error("[E1001] Missing webhook headers: {}", .missing.join(", "))]
    MissingHeaders {
        /// Names of the headers that were absent or empty
        missing: Vec<&'static str>,
    },

    /// Signature or timestamp verification failed (E1002).
    #[error("[E1002] Invalid signature: {reason}")]
    InvalidSignature {
        /// Verifier-side cause, logged but never returned to the caller
        reason: String,
    },

    /// Authentic payload without the fields the event kind requires (E1003).
    #[error("[E1003] Malformed payload: {reason}")]
    MalformedPayload {
        /// What was missing or unparseable
        reason: String,
    },

    /// User store call failed (E2001).
    #[error("[E2001] Persistence failed: {0}")]
    Persistence(#[from] CoreError),

    /// Identity provider API call failed (E2002).
    #[error("[E2002] Identity provider call failed: {0}")]
    IdentityProvider(String),
}

impl TetherError {
    /// Creates a malformed payload error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload { reason: reason.into() }
    }

    /// Creates an invalid signature error.
    pub fn invalid_signature(reason: impl Into<String>) -> Self {
        Self::InvalidSignature { reason: reason.into() }
    }

    /// Returns the error code (E0001-E2002).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "E0001",
            Self::MissingHeaders { .. } => "E1001",
            Self::InvalidSignature { .. } => "E1002",
            Self::MalformedPayload { .. } => "E1003",
            Self::Persistence(_) => "E2001",
            Self::IdentityProvider(_) => "E2002",
        }
    }

    /// Returns whether the sender caused the error.
    ///
    /// Sender errors are answered with 400 and will not succeed on redelivery
    /// of the same bytes.
    pub const fn is_sender_error(&self) -> bool {
        matches!(
            self,
            Self::MissingHeaders { .. } | Self::InvalidSignature { .. } | Self::MalformedPayload { .. }
        )
    }
}

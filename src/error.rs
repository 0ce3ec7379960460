//! Error types for referral-matrix

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Lock wait or busy timeout. Nothing was persisted; the whole
    /// operation is safe to retry.
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MatrixError {
    /// Map a Diesel error, routing lock contention to the retryable
    /// `Busy` variant and everything else to `Internal`.
    pub fn from_diesel(context: &str, err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::DatabaseError(DatabaseErrorKind::Unknown, ref info)
                if info.message().contains("database is locked") =>
            {
                MatrixError::Busy(format!("{}: {}", context, info.message()))
            }
            other => MatrixError::Internal(format!("{}: {}", context, other)),
        }
    }

    /// True when the caller should retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatrixError::Busy(_))
    }
}

// Lets `?` and Diesel transaction closures carry MatrixError
impl From<diesel::result::Error> for MatrixError {
    fn from(err: diesel::result::Error) -> Self {
        MatrixError::from_diesel("Database operation failed", err)
    }
}

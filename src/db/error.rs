//! Store Error Types
//!
//! Every orchestrator returns a `StoreError`. `kind()` collapses the variants
//! into the small taxonomy the transport layer maps to status codes.

use std::time::Duration;

use thiserror::Error;

/// SQLSTATE for unique_violation
const PG_UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for foreign_key_violation
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
/// SQLSTATE for serialization_failure
const PG_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for deadlock_detected
const PG_DEADLOCK_DETECTED: &str = "40P01";

/// Class 22 (data exception) or 23 (integrity constraint violation):
/// the statement will fail the same way every time.
fn is_data_error(sqlstate: &str) -> bool {
    sqlstate.starts_with("22") || sqlstate.starts_with("23")
}

/// Failures where the same statement may succeed on a fresh attempt
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            Some(PG_SERIALIZATION_FAILURE) | Some(PG_DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InsufficientBalance,
    InvalidOrExpiredCode,
    SelfTransfer,
    InvalidData,
    StorageError,
    OutboxEnqueueFailed,
}

#[derive(Error, Debug)]
pub enum StoreError {
    // === Row Errors ===
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Email already exists")]
    DuplicateEmail,

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    // === Domain Errors ===
    #[error("Insufficient balance on account {account_id}: balance {balance}, debit {amount}")]
    InsufficientBalance {
        account_id: i64,
        balance: i64,
        amount: i64,
    },

    #[error("Invalid or expired verification code")]
    InvalidOrExpiredCode,

    #[error("Source and destination accounts are the same")]
    SelfTransfer,

    /// Rejected by a column range or CHECK constraint
    #[error("Invalid data: {0}")]
    InvalidData(String),

    // === System Errors ===
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to enqueue task: {0:#}")]
    OutboxEnqueueFailed(anyhow::Error),

    #[error("{source}; rollback also failed: {rollback}")]
    Rollback {
        source: Box<StoreError>,
        rollback: Box<StoreError>,
    },
}

impl StoreError {
    /// Map a sqlx error by SQLSTATE. `entity` names what a foreign key points at.
    pub fn from_sqlx(err: sqlx::Error, entity: &'static str) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound(entity),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(PG_UNIQUE_VIOLATION) => {
                    let constraint = db_err.constraint().unwrap_or_default();
                    match constraint {
                        "users_pkey" => StoreError::DuplicateUsername,
                        "users_email_key" => StoreError::DuplicateEmail,
                        other => StoreError::Conflict(other.to_string()),
                    }
                }
                Some(PG_FOREIGN_KEY_VIOLATION) => StoreError::NotFound(entity),
                Some(code) if is_data_error(code) => {
                    StoreError::InvalidData(db_err.message().to_string())
                }
                _ => StoreError::Storage(err),
            },
            _ => StoreError::Storage(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::DuplicateUsername
            | StoreError::DuplicateEmail
            | StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            StoreError::InvalidOrExpiredCode => ErrorKind::InvalidOrExpiredCode,
            StoreError::SelfTransfer => ErrorKind::SelfTransfer,
            StoreError::InvalidData(_) => ErrorKind::InvalidData,
            StoreError::Storage(_) | StoreError::Timeout(_) => ErrorKind::StorageError,
            StoreError::OutboxEnqueueFailed(_) => ErrorKind::OutboxEnqueueFailed,
            StoreError::Rollback { source, .. } => source.kind(),
        }
    }

    /// Only connectivity faults, timeouts and serialization/deadlock aborts
    /// may be retried; everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Storage(err) => is_transient(err),
            StoreError::Timeout(_) => true,
            StoreError::Rollback { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::DuplicateUsername => "DUPLICATE_USERNAME",
            StoreError::DuplicateEmail => "DUPLICATE_EMAIL",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            StoreError::InvalidOrExpiredCode => "INVALID_OR_EXPIRED_CODE",
            StoreError::SelfTransfer => "SELF_TRANSFER",
            StoreError::InvalidData(_) => "INVALID_DATA",
            StoreError::Storage(_) => "STORAGE_ERROR",
            StoreError::Timeout(_) => "TIMEOUT",
            StoreError::OutboxEnqueueFailed(_) => "OUTBOX_ENQUEUE_FAILED",
            StoreError::Rollback { source, .. } => source.code(),
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::SelfTransfer | ErrorKind::InvalidData => 400,
            ErrorKind::InsufficientBalance | ErrorKind::InvalidOrExpiredCode => 422,
            ErrorKind::StorageError => 503,
            ErrorKind::OutboxEnqueueFailed => 500,
        }
    }
}

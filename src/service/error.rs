use thiserror::Error;

use super::validation::ValidationError;
use crate::db::StoreError;

fn join(violations: &[ValidationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid arguments: {}", join(.0))]
    InvalidArgument(Vec<ValidationError>),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Account {account_id} currency mismatch: {actual} vs {expected}")]
    CurrencyMismatch {
        account_id: i64,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ServiceError::Unauthenticated(_) => "UNAUTHENTICATED",
            ServiceError::PermissionDenied(_) => "PERMISSION_DENIED",
            ServiceError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            ServiceError::Store(e) => e.code(),
            ServiceError::Internal(_) => "INTERNAL",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::InvalidArgument(_) | ServiceError::CurrencyMismatch { .. } => 400,
            ServiceError::Unauthenticated(_) => 401,
            ServiceError::PermissionDenied(_) => 403,
            ServiceError::Store(e) => e.http_status(),
            ServiceError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_pass_through() {
        let err = ServiceError::from(StoreError::InsufficientBalance {
            account_id: 1,
            balance: 10,
            amount: 20,
        });
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        assert_eq!(err.http_status(), 422);
    }

    #[test]
    fn test_invalid_argument_message() {
        let err = ServiceError::InvalidArgument(vec![
            ValidationError::NotPositive { field: "amount" },
            ValidationError::NotPositive { field: "email_id" },
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid arguments: amount must be a positive integer; email_id must be a positive integer"
        );
        assert_eq!(err.http_status(), 400);
    }
}

// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External fetch failed: {0}")]
    ExternalFetch(#[from] crate::port::FetchError),

    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    #[error("No valid credential for tenant {0}")]
    MissingCredential(String),

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the processor may schedule another attempt after this error.
    ///
    /// Transient failures (network, storage, timeouts, a busy database) are retried;
    /// malformed requests, missing data and operator cancellation are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ExternalFetch(_)
            | AppError::StorageWrite(_)
            | AppError::Timeout(_)
            | AppError::Database(_)
            | AppError::Io(_) => true,
            AppError::Domain(e) => e.is_retryable(),
            AppError::Validation(_)
            | AppError::Serialization(_)
            | AppError::Config(_)
            | AppError::NotFound(_)
            | AppError::Conflict(_)
            | AppError::MissingCredential(_)
            | AppError::Cancelled(_)
            | AppError::Internal(_) => false,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in the infra-sqlite crate
// by converting to AppError::Database(String) / AppError::Conflict(String)

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::port::FetchError;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(AppError::ExternalFetch(FetchError::Unavailable("503".into())).is_retryable());
        assert!(AppError::StorageWrite("disk full".into()).is_retryable());
        assert!(AppError::Timeout(600).is_retryable());
    }

    #[test]
    fn test_fatal_errors_are_not_retryable() {
        assert!(!AppError::Domain(DomainError::InvalidPayload("missing period".into()))
            .is_retryable());
        assert!(!AppError::NotFound("nfse_1".into()).is_retryable());
        assert!(!AppError::MissingCredential("t-1".into()).is_retryable());
        assert!(!AppError::Cancelled("job-1".into()).is_retryable());
    }
}

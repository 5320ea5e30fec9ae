// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Retries exhausted for job {job_id} ({retry_count}/{max_retries})")]
    RetryExhausted {
        job_id: String,
        retry_count: i32,
        max_retries: i32,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl DomainError {
    pub fn is_retryable(&self) -> bool {
        // Every domain error describes a request that will fail the same way again
        false
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

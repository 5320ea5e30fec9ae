//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use nfse_core::domain::DomainError;
use nfse_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
    pub const SYSTEM_ERROR: i32 = 5002;
}

fn error_code(err: &AppError) -> i32 {
    match err {
        AppError::Validation(_)
        | AppError::Serialization(_)
        | AppError::MissingCredential(_) => code::VALIDATION_ERROR,
        AppError::Domain(DomainError::InvalidStateTransition { .. })
        | AppError::Domain(DomainError::RetryExhausted { .. })
        | AppError::Conflict(_)
        | AppError::Cancelled(_) => code::CONFLICT,
        AppError::NotFound(_) => code::NOT_FOUND,
        AppError::Domain(_) => code::VALIDATION_ERROR,
        AppError::Database(_) => code::DB_ERROR,
        AppError::Io(_)
        | AppError::StorageWrite(_)
        | AppError::ExternalFetch(_)
        | AppError::Timeout(_) => code::SYSTEM_ERROR,
        AppError::Config(_) | AppError::Internal(_) => code::INTERNAL_ERROR,
    }
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(error_code(&err), err.to_string(), None::<()>)
}

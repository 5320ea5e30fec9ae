// sqlx::Error -> AppError
//
// Orphan rules prevent `impl From<sqlx::Error> for AppError` here, so every
// query maps its error through this function.

use nfse_core::error::AppError;

/// Classify a sqlx error by SQLite result code (https://www.sqlite.org/rescode.html)
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
            Some(code @ ("2067" | "1555")) => AppError::Conflict(format!(
                "Unique constraint violation: {} ({})",
                db_err.message(),
                code
            )),
            // SQLITE_CONSTRAINT_FOREIGNKEY
            Some(code @ ("787" | "3850")) => AppError::Validation(format!(
                "Foreign key constraint violation: {} ({})",
                db_err.message(),
                code
            )),
            Some("5") => AppError::Database(format!(
                "Database locked (SQLITE_BUSY): {}",
                db_err.message()
            )),
            Some("13") => AppError::Database(format!("Database full: {}", db_err.message())),
            Some(code) => AppError::Database(format!(
                "Database error [{}]: {}",
                code,
                db_err.message()
            )),
            None => AppError::Database(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        // Connection, pool and protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

//! Application error types

use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown was requested while waiting or working
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Job queue closed")]
    QueueClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Cancellation is not a failure and must never be recorded as one
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}

/// Serializable error response for the polling layer
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::Database(_) => ("DATABASE_ERROR", err.to_string()),
            AppError::DuckDb(_) => ("DUCKDB_ERROR", err.to_string()),
            AppError::Serialization(_) => ("SERIALIZATION_ERROR", err.to_string()),
            AppError::Persistence(_) => ("PERSISTENCE_ERROR", err.to_string()),
            AppError::Validation(_) => ("VALIDATION_ERROR", err.to_string()),
            AppError::NotFound(_) => ("NOT_FOUND", err.to_string()),
            AppError::Config(_) => ("CONFIG_ERROR", err.to_string()),
            AppError::Io(_) => ("IO_ERROR", err.to_string()),
            AppError::Cancelled => ("CANCELLED", err.to_string()),
            AppError::QueueClosed => ("QUEUE_CLOSED", err.to_string()),
            AppError::Internal(_) => ("INTERNAL_ERROR", err.to_string()),
        };

        ErrorResponse {
            code: code.to_string(),
            message,
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        let response = match self {
            AppError::NotFound(msg) => ErrorResponse::from(AppError::NotFound(msg.clone())),
            AppError::Validation(msg) => ErrorResponse::from(AppError::Validation(msg.clone())),
            AppError::Cancelled => ErrorResponse::from(AppError::Cancelled),
            _ => ErrorResponse::from(AppError::Internal(self.to_string())),
        };
        response.serialize(serializer)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A Redis error from the direct KV backend.
    #[error("KV store error: {0}")]
    Kv(#[from] redis::RedisError),

    /// A transport error from the HTTP-proxied KV backend.
    #[error("KV transport error: {0}")]
    KvTransport(#[from] reqwest::Error),

    /// A database error from the account directory.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A database pool error.
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A database pool creation error.
    #[error("Database pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A password hashing error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An internal invariant violation.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Kv(ref e) => {
                tracing::error!("KV store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Session store error".to_string(),
                )
            }

            AppError::KvTransport(ref e) => {
                tracing::error!("KV transport error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Session store error".to_string(),
                )
            }

            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }

            AppError::Pool(ref e) => {
                tracing::error!("Database pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Database pool creation error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Encryption error".to_string(),
                )
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, body).into_response()
    }
}

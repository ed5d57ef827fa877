//! services/api/src/error.rs
//!
//! Errors that can stop the server during startup. Request-level failures are
//! `ServiceError`s and never reach this type.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The environment could not be turned into a `Config`.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connecting to PostgreSQL or running its migrations failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Binding the listener or serving connections failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Startup failed: {0}")]
    Internal(String),
}

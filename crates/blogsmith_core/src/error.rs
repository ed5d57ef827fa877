//! crates/blogsmith_core/src/error.rs
//!
//! The error type returned by user-facing operations. Every port failure is
//! converted into one of these at the boundary of the operation.

use crate::domain::UserId;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A feature whose credentials are not configured.
    #[error("{0} is not configured on this server")]
    Disabled(&'static str),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("You have used {used} of your {limit} generations. Upgrade your plan to keep generating.")]
    QuotaExceeded { used: u32, limit: u32 },

    #[error("Content generation failed: {0}")]
    Generation(String),

    /// The account should have been created at first sign-in. Not retryable.
    #[error("Account record for user {0} is missing")]
    AccountMissing(UserId),

    #[error("Could not save the generated post: {0}")]
    Persistence(String),

    #[error("Payment failed: {0}")]
    Payment(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl ServiceError {
    /// Whether repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Authentication(_)
                | ServiceError::Generation(_)
                | ServiceError::Persistence(_)
                | ServiceError::Payment(_)
        )
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

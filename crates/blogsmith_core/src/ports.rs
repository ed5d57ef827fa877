//! crates/blogsmith_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use crate::domain::{
    Account, BlogIdea, GeneratedContent, GenerationReceipt, Identity, Keyword, PlanChange, Post,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A write lost against a concurrent writer and could not be retried.
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, user_id: &UserId) -> PortResult<Account>;

    /// Creates the Free account for `identity` unless one already exists.
    /// Returns the stored record either way.
    async fn create_account_if_absent(&self, identity: &Identity) -> PortResult<Account>;

    /// Atomically creates a post owned by `user_id` and increments the
    /// account's `generations_used` and `lifetime_generations` by one.
    ///
    /// The counters are incremented from the value read inside the
    /// transaction. A missing account yields `NotFound` and no writes.
    async fn commit_generation(
        &self,
        user_id: &UserId,
        content: &GeneratedContent,
    ) -> PortResult<GenerationReceipt>;

    /// Overwrites the plan, status and limit. Usage counters are untouched.
    async fn apply_plan_change(&self, user_id: &UserId, change: PlanChange) -> PortResult<Account>;

    /// Posts owned by `user_id`, newest first.
    async fn list_posts(&self, user_id: &UserId) -> PortResult<Vec<Post>>;

    async fn get_post(&self, user_id: &UserId, post_id: Uuid) -> PortResult<Post>;
}

/// Stored email/password credentials for the built-in identity provider.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub user_id: UserId,
    pub email: String,
    pub hashed_password: String,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    async fn create_credentials(
        &self,
        email: &str,
        hashed_password: &str,
        display_name: Option<&str>,
    ) -> PortResult<UserId>;

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<StoredCredentials>;
}

#[async_trait]
pub trait AuthSessionStore: Send + Sync {
    async fn create_auth_session(
        &self,
        token: &str,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a session token. Unknown or expired tokens are `Unauthorized`.
    async fn validate_auth_session(&self, token: &str) -> PortResult<UserId>;

    async fn delete_auth_session(&self, token: &str) -> PortResult<()>;
}

//=========================================================================================
// External Collaborator Ports
//=========================================================================================

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(
        &self,
        credentials: &Credentials,
        display_name: Option<&str>,
    ) -> PortResult<Identity>;

    async fn sign_in(&self, credentials: &Credentials) -> PortResult<Identity>;
}

#[async_trait]
pub trait FederatedIdentityProvider: Send + Sync {
    /// Verifies a token issued by the federated provider.
    async fn sign_in_with_token(&self, id_token: &str) -> PortResult<Identity>;
}

#[async_trait]
pub trait ContentGenerationService: Send + Sync {
    /// Brainstorms titles with outlines for a topic.
    async fn generate_ideas(&self, topic: &str, audience: Option<&str>) -> PortResult<Vec<BlogIdea>>;

    /// Writes the long-form article for a selected idea.
    async fn generate_article(&self, title: &str, outline: &str) -> PortResult<String>;

    /// Suggests SEO keywords for a selected idea.
    async fn generate_keywords(&self, title: &str, outline: &str) -> PortResult<Vec<Keyword>>;
}

/// An amount in a currency, formatted the way payment providers expect ("9.00").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price {
    pub amount: &'static str,
    pub currency: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStatus {
    Completed,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub status: CaptureStatus,
    pub detail: Option<String>,
    /// The captured amount, when the provider reports one.
    pub amount: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an order for `price` and returns the provider's order id.
    async fn create_order(&self, price: Price) -> PortResult<String>;

    async fn capture_order(&self, order_id: &str) -> PortResult<CaptureOutcome>;
}

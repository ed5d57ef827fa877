//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the persistence ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use blogsmith_core::domain::{
    Account, GeneratedContent, GenerationReceipt, Identity, Keyword, Plan, PlanChange, Post,
    Subscription, SubscriptionStatus, UserId,
};
use blogsmith_core::ports::{
    AccountStore, AuthSessionStore, CredentialStore, PortError, PortResult, StoredCredentials,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::future::Future;
use tracing::warn;
use uuid::Uuid;

/// How many times a generation commit is attempted before giving up.
const MAX_COMMIT_ATTEMPTS: u32 = 5;

const ACCOUNT_COLUMNS: &str = "user_id, email, display_name, photo_url, plan, status, \
     generations_used, generations_limit, lifetime_generations, version";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// One attempt at the generation transaction.
    async fn try_commit_generation(
        &self,
        user_id: &UserId,
        content: &GeneratedContent,
    ) -> Result<GenerationReceipt, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Lock the account row; the increment below is relative to this read.
        let current = sqlx::query_as::<_, CounterRecord>(
            "SELECT generations_used, lifetime_generations, version \
             FROM accounts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            tx.rollback().await?;
            return Err(sqlx::Error::RowNotFound);
        };

        let keywords: Vec<KeywordRecord> = content.keywords.iter().map(KeywordRecord::from).collect();
        let post = sqlx::query_as::<_, PostRecord>(
            "INSERT INTO posts (id, user_id, title, outline, full_content, keywords) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, user_id, title, outline, full_content, keywords, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id.as_str())
        .bind(&content.title)
        .bind(&content.outline)
        .bind(&content.full_content)
        .bind(Json(keywords))
        .fetch_one(&mut *tx)
        .await?;

        let account = sqlx::query_as::<_, AccountRecord>(&format!(
            "UPDATE accounts SET generations_used = $2, lifetime_generations = $3, version = $4 \
             WHERE user_id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(user_id.as_str())
        .bind(current.generations_used + 1)
        .bind(current.lifetime_generations + 1)
        .bind(current.version + 1)
        .fetch_one(&mut *tx)
        .await?;

        // Decode while the transaction can still roll back.
        let receipt = decode_receipt(post, account)?;
        tx.commit().await?;
        Ok(receipt)
    }
}

fn decode_receipt(post: PostRecord, account: AccountRecord) -> Result<GenerationReceipt, sqlx::Error> {
    let account = account.to_domain().map_err(|e| sqlx::Error::Decode(e.into()))?;
    Ok(GenerationReceipt {
        post: post.to_domain(),
        account,
    })
}

/// Runs `attempt_once` until it succeeds, retrying serialization failures and
/// deadlocks up to `MAX_COMMIT_ATTEMPTS` times in total.
async fn with_commit_retries<T, F, Fut>(user_id: &UserId, mut attempt_once: F) -> PortResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 1;
    loop {
        match attempt_once().await {
            Ok(value) => return Ok(value),
            Err(sqlx::Error::RowNotFound) => {
                return Err(PortError::NotFound(format!("Account {} not found", user_id)))
            }
            Err(e) if is_retryable(&e) && attempt < MAX_COMMIT_ATTEMPTS => {
                warn!(
                    "Generation commit for user {} conflicted (attempt {}): {}",
                    user_id, attempt, e
                );
                attempt += 1;
            }
            Err(e) if is_retryable(&e) => {
                return Err(PortError::Conflict(format!(
                    "Gave up after {} attempts: {}",
                    attempt, e
                )))
            }
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        }
    }
}

/// Serialization failures and deadlocks are safe to retry from the top.
fn is_retryable(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001") | Some("40P01")),
        _ => false,
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct AccountRecord {
    user_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    plan: String,
    status: String,
    generations_used: i64,
    generations_limit: i64,
    lifetime_generations: i64,
    version: i64,
}
impl AccountRecord {
    fn to_domain(self) -> PortResult<Account> {
        let invalid = |field: &str, e: String| {
            PortError::Unexpected(format!("Account {} has an invalid {}: {}", self.user_id, field, e))
        };
        let subscription = Subscription {
            plan: self
                .plan
                .parse::<Plan>()
                .map_err(|e| invalid("plan", e.to_string()))?,
            status: self
                .status
                .parse::<SubscriptionStatus>()
                .map_err(|e| invalid("status", e.to_string()))?,
            generations_used: u32::try_from(self.generations_used)
                .map_err(|e| invalid("generations_used", e.to_string()))?,
            generations_limit: u32::try_from(self.generations_limit)
                .map_err(|e| invalid("generations_limit", e.to_string()))?,
            lifetime_generations: u64::try_from(self.lifetime_generations)
                .map_err(|e| invalid("lifetime_generations", e.to_string()))?,
        };
        let version =
            u64::try_from(self.version).map_err(|e| invalid("version", e.to_string()))?;
        Ok(Account {
            user_id: UserId::new(self.user_id),
            email: self.email,
            display_name: self.display_name,
            photo_url: self.photo_url,
            subscription,
            version,
        })
    }
}

#[derive(FromRow)]
struct CounterRecord {
    generations_used: i64,
    lifetime_generations: i64,
    version: i64,
}

#[derive(Serialize, Deserialize)]
struct KeywordRecord {
    keyword: String,
    explanation: String,
}
impl From<&Keyword> for KeywordRecord {
    fn from(k: &Keyword) -> Self {
        Self {
            keyword: k.keyword.clone(),
            explanation: k.explanation.clone(),
        }
    }
}

#[derive(FromRow)]
struct PostRecord {
    id: Uuid,
    user_id: String,
    title: String,
    outline: String,
    full_content: String,
    keywords: Json<Vec<KeywordRecord>>,
    created_at: DateTime<Utc>,
}
impl PostRecord {
    fn to_domain(self) -> Post {
        Post {
            id: self.id,
            user_id: UserId::new(self.user_id),
            title: self.title,
            outline: self.outline,
            full_content: self.full_content,
            keywords: self
                .keywords
                .0
                .into_iter()
                .map(|k| Keyword {
                    keyword: k.keyword,
                    explanation: k.explanation,
                })
                .collect(),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: String,
    email: String,
    hashed_password: String,
    display_name: Option<String>,
}

#[derive(FromRow)]
struct AuthSessionRecord {
    user_id: String,
    expires_at: DateTime<Utc>,
}

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn get_account(&self, user_id: &UserId) -> PortResult<Account> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            "SELECT {} FROM accounts WHERE user_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Account {} not found", user_id)))?;
        record.to_domain()
    }

    async fn create_account_if_absent(&self, identity: &Identity) -> PortResult<Account> {
        sqlx::query(
            "INSERT INTO accounts (user_id, email, display_name, photo_url) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(identity.uid.as_str())
        .bind(&identity.email)
        .bind(&identity.display_name)
        .bind(&identity.photo_url)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.get_account(&identity.uid).await
    }

    async fn commit_generation(
        &self,
        user_id: &UserId,
        content: &GeneratedContent,
    ) -> PortResult<GenerationReceipt> {
        with_commit_retries(user_id, move || self.try_commit_generation(user_id, content)).await
    }

    async fn apply_plan_change(&self, user_id: &UserId, change: PlanChange) -> PortResult<Account> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            "UPDATE accounts SET plan = $2, status = $3, generations_limit = $4, version = version + 1 \
             WHERE user_id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(user_id.as_str())
        .bind(change.plan.as_str())
        .bind(change.status.as_str())
        .bind(i64::from(change.generations_limit))
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Account {} not found", user_id)))?;
        record.to_domain()
    }

    async fn list_posts(&self, user_id: &UserId) -> PortResult<Vec<Post>> {
        let records = sqlx::query_as::<_, PostRecord>(
            "SELECT id, user_id, title, outline, full_content, keywords, created_at \
             FROM posts WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let posts = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(posts)
    }

    async fn get_post(&self, user_id: &UserId, post_id: Uuid) -> PortResult<Post> {
        let record = sqlx::query_as::<_, PostRecord>(
            "SELECT id, user_id, title, outline, full_content, keywords, created_at \
             FROM posts WHERE id = $1 AND user_id = $2",
        )
        .bind(post_id)
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Post {} not found", post_id)))?;
        Ok(record.to_domain())
    }
}

//=========================================================================================
// `CredentialStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CredentialStore for DbAdapter {
    async fn create_credentials(
        &self,
        email: &str,
        hashed_password: &str,
        display_name: Option<&str>,
    ) -> PortResult<UserId> {
        let email = email.trim().to_lowercase();
        let user_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO credentials (user_id, email, hashed_password, display_name) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&user_id)
        .bind(&email)
        .bind(hashed_password)
        .bind(display_name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict(format!("Email {} is already registered", email))
            } else {
                PortError::Unexpected(e.to_string())
            }
        })?;
        Ok(UserId::new(user_id))
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<StoredCredentials> {
        let email = email.trim().to_lowercase();
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password, display_name FROM credentials WHERE email = $1",
        )
        .bind(&email)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("No credentials for {}", email)))?;
        Ok(StoredCredentials {
            user_id: UserId::new(record.user_id),
            email: record.email,
            hashed_password: record.hashed_password,
            display_name: record.display_name,
        })
    }
}

//=========================================================================================
// `AuthSessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthSessionStore for DbAdapter {
    async fn create_auth_session(
        &self,
        token: &str,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user_id.as_str())
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<UserId> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT user_id, expires_at FROM auth_sessions WHERE id = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .ok_or(PortError::Unauthorized)?;

        if record.expires_at <= Utc::now() {
            self.delete_auth_session(token).await?;
            return Err(PortError::Unauthorized);
        }
        Ok(UserId::new(record.user_id))
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}

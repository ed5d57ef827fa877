//! crates/blogsmith_core/src/memory.rs
//!
//! An in-process store implementing the persistence ports. Everything sits
//! behind one async mutex, so each operation is atomic with respect to every
//! other. Data does not survive a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Account, GeneratedContent, GenerationReceipt, Identity, PlanChange, Post, UserId};
use crate::ports::{
    AccountStore, AuthSessionStore, CredentialStore, PortError, PortResult, StoredCredentials,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<UserId, Account>,
    posts: Vec<Post>,
    credentials: HashMap<String, StoredCredentials>,
    auth_sessions: HashMap<String, (UserId, DateTime<Utc>)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an account record verbatim.
    pub async fn put_account(&self, account: Account) {
        let mut inner = self.inner.lock().await;
        inner.accounts.insert(account.user_id.clone(), account);
    }

    pub async fn post_count(&self) -> usize {
        self.inner.lock().await.posts.len()
    }

    pub async fn account_count(&self) -> usize {
        self.inner.lock().await.accounts.len()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_account(&self, user_id: &UserId) -> PortResult<Account> {
        let inner = self.inner.lock().await;
        inner
            .accounts
            .get(user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Account {} not found", user_id)))
    }

    async fn create_account_if_absent(&self, identity: &Identity) -> PortResult<Account> {
        let mut inner = self.inner.lock().await;
        let account = inner
            .accounts
            .entry(identity.uid.clone())
            .or_insert_with(|| Account::new_free(identity));
        Ok(account.clone())
    }

    async fn commit_generation(
        &self,
        user_id: &UserId,
        content: &GeneratedContent,
    ) -> PortResult<GenerationReceipt> {
        let mut inner = self.inner.lock().await;
        let Some(account) = inner.accounts.get_mut(user_id) else {
            return Err(PortError::NotFound(format!("Account {} not found", user_id)));
        };
        account.subscription.generations_used += 1;
        account.subscription.lifetime_generations += 1;
        account.version += 1;
        let account = account.clone();

        let post = Post {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            title: content.title.clone(),
            outline: content.outline.clone(),
            full_content: content.full_content.clone(),
            keywords: content.keywords.clone(),
            created_at: Utc::now(),
        };
        inner.posts.push(post.clone());

        Ok(GenerationReceipt { post, account })
    }

    async fn apply_plan_change(&self, user_id: &UserId, change: PlanChange) -> PortResult<Account> {
        let mut inner = self.inner.lock().await;
        let account = inner
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| PortError::NotFound(format!("Account {} not found", user_id)))?;
        account.subscription.plan = change.plan;
        account.subscription.status = change.status;
        account.subscription.generations_limit = change.generations_limit;
        account.version += 1;
        Ok(account.clone())
    }

    async fn list_posts(&self, user_id: &UserId) -> PortResult<Vec<Post>> {
        let inner = self.inner.lock().await;
        // Posts are appended in commit order, so reverse insertion order is
        // newest first even when timestamps tie.
        Ok(inner
            .posts
            .iter()
            .rev()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_post(&self, user_id: &UserId, post_id: Uuid) -> PortResult<Post> {
        let inner = self.inner.lock().await;
        inner
            .posts
            .iter()
            .find(|p| p.id == post_id && &p.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Post {} not found", post_id)))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_credentials(
        &self,
        email: &str,
        hashed_password: &str,
        display_name: Option<&str>,
    ) -> PortResult<UserId> {
        let email = normalize_email(email);
        let mut inner = self.inner.lock().await;
        if inner.credentials.contains_key(&email) {
            return Err(PortError::Conflict(format!("Email {} is already registered", email)));
        }
        let user_id = UserId::new(Uuid::new_v4().to_string());
        inner.credentials.insert(
            email.clone(),
            StoredCredentials {
                user_id: user_id.clone(),
                email,
                hashed_password: hashed_password.to_string(),
                display_name: display_name.map(str::to_string),
            },
        );
        Ok(user_id)
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<StoredCredentials> {
        let email = normalize_email(email);
        let inner = self.inner.lock().await;
        inner
            .credentials
            .get(&email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("No credentials for {}", email)))
    }
}

#[async_trait]
impl AuthSessionStore for MemoryStore {
    async fn create_auth_session(
        &self,
        token: &str,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .auth_sessions
            .insert(token.to_string(), (user_id.clone(), expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<UserId> {
        let mut inner = self.inner.lock().await;
        match inner.auth_sessions.get(token) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(user_id.clone()),
            Some(_) => {
                inner.auth_sessions.remove(token);
                Err(PortError::Unauthorized)
            }
            None => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        self.inner.lock().await.auth_sessions.remove(token);
        Ok(())
    }
}

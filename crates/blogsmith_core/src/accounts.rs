//! crates/blogsmith_core/src/accounts.rs
//!
//! Account onboarding and read access to accounts and posts.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Account, Identity, Post, UserId};
use crate::error::{ServiceError, ServiceResult};
use crate::feed::{AccountFeed, FeedSubscription};
use crate::ports::{AccountStore, PortError};

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    feed: Arc<AccountFeed>,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, feed: Arc<AccountFeed>) -> Self {
        Self { store, feed }
    }

    /// Called after every successful sign-in. Creates the Free account on
    /// the first one; later calls return the stored record unchanged.
    pub async fn ensure_account(&self, identity: &Identity) -> ServiceResult<Account> {
        let account = self
            .store
            .create_account_if_absent(identity)
            .await
            .map_err(|e| ServiceError::Persistence(e.to_string()))?;
        info!("Signed in user {} on the {} plan", identity.uid, account.subscription.plan);
        self.feed.publish(account.user_id.as_str(), account.clone());
        Ok(account)
    }

    pub async fn account(&self, user_id: &UserId) -> ServiceResult<Account> {
        self.store.get_account(user_id).await.map_err(|e| match e {
            PortError::NotFound(_) => ServiceError::AccountMissing(user_id.clone()),
            other => ServiceError::Persistence(other.to_string()),
        })
    }

    pub async fn posts(&self, user_id: &UserId) -> ServiceResult<Vec<Post>> {
        self.store
            .list_posts(user_id)
            .await
            .map_err(|e| ServiceError::Persistence(e.to_string()))
    }

    pub async fn post(&self, user_id: &UserId, post_id: Uuid) -> ServiceResult<Post> {
        self.store.get_post(user_id, post_id).await.map_err(|e| match e {
            PortError::NotFound(_) => ServiceError::NotFound(format!("Post {}", post_id)),
            other => ServiceError::Persistence(other.to_string()),
        })
    }

    /// Live account snapshots for `user_id`, starting with the current one.
    pub async fn subscribe(&self, user_id: &UserId) -> ServiceResult<(Account, FeedSubscription<Account>)> {
        // Subscribe before reading so no write between the two is missed.
        let mut subscription = self.feed.subscribe(user_id.as_str());
        let current = self.account(user_id).await?;
        subscription.seen(&current);
        Ok((current, subscription))
    }
}

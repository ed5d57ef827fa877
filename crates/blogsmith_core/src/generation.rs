//! crates/blogsmith_core/src/generation.rs
//!
//! Orchestrates content generation and the metered write that records it.
//!
//! The quota check is optimistic: it reads the latest stored snapshot before
//! any content is generated, outside the transaction that increments the
//! counters. Two requests racing from the same account at `limit - 1` can
//! both pass it and both commit, leaving `generations_used` one past the
//! limit. Each commit on its own is still atomic.

use futures::future::try_join;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{BlogIdea, GeneratedContent, Keyword, Post, UserId};
use crate::error::{ServiceError, ServiceResult};
use crate::feed::AccountFeed;
use crate::ports::{AccountStore, ContentGenerationService, PortError};

/// Upper bound on the ideas returned for one topic.
pub const MAX_IDEAS: usize = 7;

#[derive(Clone)]
pub struct GenerationService {
    store: Arc<dyn AccountStore>,
    generator: Arc<dyn ContentGenerationService>,
    feed: Arc<AccountFeed>,
}

impl GenerationService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        generator: Arc<dyn ContentGenerationService>,
        feed: Arc<AccountFeed>,
    ) -> Self {
        Self {
            store,
            generator,
            feed,
        }
    }

    /// Brainstorms blog ideas for a topic. Nothing is persisted.
    pub async fn generate_ideas(
        &self,
        topic: &str,
        audience: Option<&str>,
    ) -> ServiceResult<Vec<BlogIdea>> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ServiceError::InvalidInput("Topic is required.".to_string()));
        }
        let audience = audience.map(str::trim).filter(|a| !a.is_empty());

        let ideas = self
            .generator
            .generate_ideas(topic, audience)
            .await
            .map_err(|e| {
                error!("Idea generation failed for '{}': {}", topic, e);
                ServiceError::Generation(e.to_string())
            })?;

        let ideas: Vec<BlogIdea> = ideas
            .into_iter()
            .filter(|idea| !idea.title.trim().is_empty() && !idea.outline.trim().is_empty())
            .take(MAX_IDEAS)
            .collect();
        if ideas.is_empty() {
            return Err(ServiceError::Generation(
                "The model did not return any usable ideas.".to_string(),
            ));
        }
        info!("Generated {} ideas for '{}'", ideas.len(), topic);
        Ok(ideas)
    }

    /// Writes the article and suggests keywords for a selected idea.
    ///
    /// Both prompts run concurrently. The result exists only if both
    /// succeed; a failure of either discards the other's output.
    pub async fn generate_content(&self, title: &str, outline: &str) -> ServiceResult<GeneratedContent> {
        let title = title.trim();
        let outline = outline.trim();
        if title.is_empty() || outline.is_empty() {
            return Err(ServiceError::InvalidInput(
                "A title and an outline are required.".to_string(),
            ));
        }

        let (full_content, keywords) = try_join(
            self.generator.generate_article(title, outline),
            self.generator.generate_keywords(title, outline),
        )
        .await
        .map_err(|e| {
            error!("Content generation failed for '{}': {}", title, e);
            ServiceError::Generation(e.to_string())
        })?;

        let keywords: Vec<Keyword> = keywords
            .into_iter()
            .filter(|k| !k.keyword.trim().is_empty())
            .collect();

        Ok(GeneratedContent {
            title: title.to_string(),
            outline: outline.to_string(),
            full_content,
            keywords,
        })
    }

    /// Checks the account's latest snapshot for remaining quota.
    pub async fn check_quota(&self, user_id: &UserId) -> ServiceResult<()> {
        let account = self
            .store
            .get_account(user_id)
            .await
            .map_err(|e| account_error(user_id, e))?;
        let sub = &account.subscription;
        if !sub.has_quota() {
            info!(
                "User {} is out of generations ({}/{})",
                user_id, sub.generations_used, sub.generations_limit
            );
            return Err(ServiceError::QuotaExceeded {
                used: sub.generations_used,
                limit: sub.generations_limit,
            });
        }
        Ok(())
    }

    /// Persists `content` as a new post and meters it, as one atomic step.
    ///
    /// On failure nothing is written. The content is not resubmitted; the
    /// caller has to generate again.
    pub async fn record_generation(
        &self,
        user_id: &UserId,
        content: &GeneratedContent,
    ) -> ServiceResult<Post> {
        let receipt = self
            .store
            .commit_generation(user_id, content)
            .await
            .map_err(|e| account_error(user_id, e))?;

        let sub = &receipt.account.subscription;
        info!(
            "Recorded post {} for user {} ({}/{} used, {} lifetime)",
            receipt.post.id, user_id, sub.generations_used, sub.generations_limit, sub.lifetime_generations
        );
        self.feed.publish(user_id.as_str(), receipt.account);
        Ok(receipt.post)
    }

    /// Runs the whole flow: quota pre-check, content generation, then the
    /// metered write.
    pub async fn generate_post(
        &self,
        user_id: &UserId,
        title: &str,
        outline: &str,
    ) -> ServiceResult<Post> {
        self.check_quota(user_id).await?;
        let content = self.generate_content(title, outline).await?;
        self.record_generation(user_id, &content).await
    }
}

fn account_error(user_id: &UserId, error: PortError) -> ServiceError {
    match error {
        PortError::NotFound(_) => {
            error!("Account record for user {} is missing", user_id);
            ServiceError::AccountMissing(user_id.clone())
        }
        other => {
            warn!("Account store failure for user {}: {}", user_id, other);
            ServiceError::Persistence(other.to_string())
        }
    }
}

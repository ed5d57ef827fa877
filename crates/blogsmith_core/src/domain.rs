//! crates/blogsmith_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Generation allowance granted to every new account.
pub const FREE_GENERATIONS_LIMIT: u32 = 3;

/// Opaque user id issued by the identity provider. Primary key of an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated identity as reported by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plan {
    Free,
    Monthly,
    Annual,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Free, Plan::Monthly, Plan::Annual];

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Monthly => "Monthly",
            Plan::Annual => "Annual",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a plan or status from its wire spelling fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct UnknownValue(pub String);

impl FromStr for Plan {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Free" => Ok(Plan::Free),
            "Monthly" => Ok(Plan::Monthly),
            "Annual" => Ok(Plan::Annual),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// Plan and usage counters of one account.
///
/// `lifetime_generations` only ever grows. `generations_used` is compared
/// against `generations_limit` before a generation starts, but nothing at
/// the storage level prevents it from passing the limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub generations_used: u32,
    pub generations_limit: u32,
    pub lifetime_generations: u64,
}

impl Subscription {
    pub fn free() -> Self {
        Self {
            plan: Plan::Free,
            status: SubscriptionStatus::Active,
            generations_used: 0,
            generations_limit: FREE_GENERATIONS_LIMIT,
            lifetime_generations: 0,
        }
    }

    pub fn has_quota(&self) -> bool {
        self.generations_used < self.generations_limit
    }
}

/// The per-user account record: profile mirror plus subscription state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub subscription: Subscription,
    /// Bumped by the store on every write to this record.
    pub version: u64,
}

impl Account {
    /// The record created on a user's first successful sign-in.
    pub fn new_free(identity: &Identity) -> Self {
        Self {
            user_id: identity.uid.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            photo_url: identity.photo_url.clone(),
            subscription: Subscription::free(),
            version: 1,
        }
    }
}

/// Plan fields written by a completed payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanChange {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub generations_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub keyword: String,
    pub explanation: String,
}

/// A candidate blog post produced by idea generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogIdea {
    pub title: String,
    pub outline: String,
}

/// The output of full content generation, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub title: String,
    pub outline: String,
    pub full_content: String,
    pub keywords: Vec<Keyword>,
}

/// A persisted generation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub user_id: UserId,
    pub title: String,
    pub outline: String,
    pub full_content: String,
    pub keywords: Vec<Keyword>,
    /// Assigned by the store at commit time.
    pub created_at: DateTime<Utc>,
}

/// Both effects of a committed generation.
#[derive(Debug, Clone)]
pub struct GenerationReceipt {
    pub post: Post,
    pub account: Account,
}

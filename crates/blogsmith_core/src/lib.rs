pub mod accounts;
pub mod billing;
pub mod domain;
pub mod error;
pub mod feed;
pub mod generation;
pub mod memory;
pub mod ports;
pub mod session;

pub use accounts::AccountService;
pub use billing::{BillingService, PlanCatalog, PlanTerms};
pub use domain::{
    Account, BlogIdea, GeneratedContent, GenerationReceipt, Identity, Keyword, Plan, PlanChange,
    Post, Subscription, SubscriptionStatus, UserId,
};
pub use error::{ServiceError, ServiceResult};
pub use feed::{AccountFeed, ChangeFeed, FeedSubscription, Versioned};
pub use generation::GenerationService;
pub use memory::MemoryStore;
pub use ports::{
    AccountStore, AuthSessionStore, CaptureOutcome, CaptureStatus, ContentGenerationService,
    CredentialStore, Credentials, FederatedIdentityProvider, IdentityProvider, PaymentGateway,
    PortError, PortResult, Price, StoredCredentials,
};
pub use session::{SessionContext, SessionWatch};

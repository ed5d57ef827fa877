//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::PasswordIdentityProvider;
use crate::config::Config;
use blogsmith_core::{
    ports::{
        AccountStore, AuthSessionStore, ContentGenerationService, CredentialStore,
        FederatedIdentityProvider, IdentityProvider, PaymentGateway,
    },
    AccountFeed, AccountService, BillingService, GenerationService, SessionWatch,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// Features whose external credentials are missing are `None`; their
/// endpoints answer 503 instead of the server refusing to start.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: AccountService,
    pub auth_sessions: Arc<dyn AuthSessionStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub federated: Option<Arc<dyn FederatedIdentityProvider>>,
    pub generation: Option<GenerationService>,
    pub billing: Option<BillingService>,
    pub session_watch: Arc<SessionWatch>,
}

/// The external collaborators that could be configured at startup.
#[derive(Default)]
pub struct Collaborators {
    pub generator: Option<Arc<dyn ContentGenerationService>>,
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub federated: Option<Arc<dyn FederatedIdentityProvider>>,
}

impl AppState {
    /// Wires the services over one store that holds accounts, credentials
    /// and auth sessions.
    pub fn new<S>(config: Arc<Config>, store: Arc<S>, collaborators: Collaborators) -> Self
    where
        S: AccountStore + CredentialStore + AuthSessionStore + 'static,
    {
        let feed = Arc::new(AccountFeed::new());
        let accounts_store: Arc<dyn AccountStore> = store.clone();

        let generation = collaborators
            .generator
            .map(|generator| GenerationService::new(accounts_store.clone(), generator, feed.clone()));
        let billing = collaborators
            .gateway
            .map(|gateway| BillingService::new(accounts_store.clone(), gateway, feed.clone()));

        Self {
            config,
            accounts: AccountService::new(accounts_store, feed),
            auth_sessions: store.clone(),
            identity: Arc::new(PasswordIdentityProvider::new(store)),
            federated: collaborators.federated,
            generation,
            billing,
            session_watch: Arc::new(SessionWatch::new()),
        }
    }
}

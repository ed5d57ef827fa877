//! services/api/src/adapters/password_auth.rs
//!
//! Email and password sign-in. Implements the `IdentityProvider` port on top
//! of any `CredentialStore`, hashing passwords with Argon2.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use blogsmith_core::{
    domain::Identity,
    ports::{CredentialStore, Credentials, IdentityProvider, PortError, PortResult},
};
use tracing::{error, warn};

#[derive(Clone)]
pub struct PasswordIdentityProvider {
    store: Arc<dyn CredentialStore>,
}

impl PasswordIdentityProvider {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IdentityProvider for PasswordIdentityProvider {
    async fn sign_up(
        &self,
        credentials: &Credentials,
        display_name: Option<&str>,
    ) -> PortResult<Identity> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(credentials.password.as_bytes(), &salt)
            .map_err(|e| {
                error!("Failed to hash password: {:?}", e);
                PortError::Unexpected("Failed to hash password".to_string())
            })?
            .to_string();

        let user_id = self
            .store
            .create_credentials(&credentials.email, &password_hash, display_name)
            .await?;

        Ok(Identity {
            uid: user_id,
            email: Some(credentials.email.trim().to_lowercase()),
            display_name: display_name.map(str::to_string),
            photo_url: None,
        })
    }

    async fn sign_in(&self, credentials: &Credentials) -> PortResult<Identity> {
        let stored = match self.store.get_credentials_by_email(&credentials.email).await {
            Ok(stored) => stored,
            Err(PortError::NotFound(_)) => return Err(PortError::Unauthorized),
            Err(e) => return Err(e),
        };

        let parsed_hash = PasswordHash::new(&stored.hashed_password).map_err(|e| {
            error!("Failed to parse password hash: {:?}", e);
            PortError::Unexpected("Authentication error".to_string())
        })?;

        if Argon2::default()
            .verify_password(credentials.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            warn!("Rejected sign-in for {}", stored.email);
            return Err(PortError::Unauthorized);
        }

        Ok(Identity {
            uid: stored.user_id,
            email: Some(stored.email),
            display_name: stored.display_name,
            photo_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blogsmith_core::memory::MemoryStore;

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_yields_the_same_uid() {
        let provider = PasswordIdentityProvider::new(Arc::new(MemoryStore::new()));

        let created = provider
            .sign_up(&credentials("Writer@Example.com", "hunter22"), Some("Writer"))
            .await
            .unwrap();
        let signed_in = provider
            .sign_in(&credentials("writer@example.com", "hunter22"))
            .await
            .unwrap();

        assert_eq!(created.uid, signed_in.uid);
        assert_eq!(signed_in.email.as_deref(), Some("writer@example.com"));
        assert_eq!(signed_in.display_name.as_deref(), Some("Writer"));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_unauthorized() {
        let provider = PasswordIdentityProvider::new(Arc::new(MemoryStore::new()));
        provider
            .sign_up(&credentials("a@example.com", "correct-horse"), None)
            .await
            .unwrap();

        assert!(matches!(
            provider.sign_in(&credentials("a@example.com", "wrong")).await,
            Err(PortError::Unauthorized)
        ));
        assert!(matches!(
            provider.sign_in(&credentials("b@example.com", "correct-horse")).await,
            Err(PortError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_a_conflict() {
        let provider = PasswordIdentityProvider::new(Arc::new(MemoryStore::new()));
        provider
            .sign_up(&credentials("a@example.com", "secret1"), None)
            .await
            .unwrap();

        assert!(matches!(
            provider.sign_up(&credentials("A@example.com", "secret2"), None).await,
            Err(PortError::Conflict(_))
        ));
    }
}

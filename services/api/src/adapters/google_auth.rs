//! services/api/src/adapters/google_auth.rs
//!
//! Google sign-in. Implements the `FederatedIdentityProvider` port by handing
//! the browser's ID token to Google's tokeninfo endpoint for verification.

use async_trait::async_trait;
use blogsmith_core::{
    domain::{Identity, UserId},
    ports::{FederatedIdentityProvider, PortError, PortResult},
};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// The claims we read from a verified Google ID token.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    iss: String,
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl TokenInfo {
    fn into_identity(self, client_id: &str) -> PortResult<Identity> {
        if self.aud != client_id {
            warn!("Rejected a Google token issued for another client");
            return Err(PortError::Unauthorized);
        }
        if !ISSUERS.contains(&self.iss.as_str()) {
            warn!("Rejected a Google token from issuer {}", self.iss);
            return Err(PortError::Unauthorized);
        }
        Ok(Identity {
            uid: UserId::new(format!("google:{}", self.sub)),
            email: self.email.map(|e| e.to_lowercase()),
            display_name: self.name,
            photo_url: self.picture,
        })
    }
}

#[derive(Clone)]
pub struct GoogleIdentityProvider {
    client: Client,
    client_id: String,
    tokeninfo_url: String,
}

impl GoogleIdentityProvider {
    pub fn new(client: Client, client_id: String) -> Self {
        Self {
            client,
            client_id,
            tokeninfo_url: TOKENINFO_URL.to_string(),
        }
    }
}

#[async_trait]
impl FederatedIdentityProvider for GoogleIdentityProvider {
    async fn sign_in_with_token(&self, id_token: &str) -> PortResult<Identity> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to reach Google: {}", e)))?;

        // Google answers 400 for expired, forged or malformed tokens.
        if response.status().is_client_error() {
            return Err(PortError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "Google token verification failed with status {}",
                response.status()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        info.into_identity(&self.client_id)
    }
}

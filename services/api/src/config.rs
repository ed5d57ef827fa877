//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Credentials for external services are
//! optional: a missing set switches the matching feature off instead of
//! stopping the server.

use std::net::SocketAddr;
use tracing::{warn, Level};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for the PayPal REST API.
#[derive(Clone, Debug)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_url: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub cors_origin: String,
    pub session_ttl_days: i64,
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub ideas_model: String,
    pub article_model: String,
    pub keywords_model: String,
    pub google_client_id: Option<String>,
    pub paypal: Option<PayPalConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            log_level: Level::INFO,
            cors_origin: "http://localhost:3000".to_string(),
            session_ttl_days: 30,
            openai_api_key: None,
            openai_api_base: None,
            ideas_model: "gpt-4o-mini".to_string(),
            article_model: "gpt-4o".to_string(),
            keywords_model: "gpt-4o-mini".to_string(),
            google_client_id: None,
            paypal: None,
        }
    }
}

/// Reads an optional variable, treating blank values as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Longest accepted session lifetime, ten years.
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

fn parse_session_ttl(value: &str) -> Result<i64, ConfigError> {
    value
        .parse::<i64>()
        .ok()
        .filter(|days| (1..=MAX_SESSION_TTL_DAYS).contains(days))
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                format!(
                    "'{}' is not a number of days between 1 and {}",
                    value, MAX_SESSION_TTL_DAYS
                ),
            )
        })
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        // --- Load Server and Database Settings ---
        let bind_address = match optional_var("BIND_ADDRESS") {
            Some(value) => value.parse::<SocketAddr>().map_err(|e| {
                ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
            })?,
            None => defaults.bind_address,
        };

        let database_url = optional_var("DATABASE_URL");

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = optional_var("CORS_ORIGIN").unwrap_or(defaults.cors_origin);

        let session_ttl_days = match optional_var("SESSION_TTL_DAYS") {
            Some(value) => parse_session_ttl(&value)?,
            None => defaults.session_ttl_days,
        };

        // --- Load API Keys (as optional) ---
        let openai_api_key = optional_var("OPENAI_API_KEY");
        let openai_api_base = optional_var("OPENAI_API_BASE");
        let google_client_id = optional_var("GOOGLE_CLIENT_ID");
        let paypal = Self::paypal_from_env();

        // --- Load Adapter-specific Settings ---
        let ideas_model = optional_var("IDEAS_MODEL").unwrap_or(defaults.ideas_model);
        let article_model = optional_var("ARTICLE_MODEL").unwrap_or(defaults.article_model);
        let keywords_model = optional_var("KEYWORDS_MODEL").unwrap_or(defaults.keywords_model);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            session_ttl_days,
            openai_api_key,
            openai_api_base,
            ideas_model,
            article_model,
            keywords_model,
            google_client_id,
            paypal,
        })
    }

    /// PayPal needs all three variables; a partial set disables payments.
    fn paypal_from_env() -> Option<PayPalConfig> {
        let client_id = optional_var("PAYPAL_CLIENT_ID");
        let client_secret = optional_var("PAYPAL_CLIENT_SECRET");
        let api_url = optional_var("PAYPAL_API_URL");
        match (client_id, client_secret, api_url) {
            (Some(client_id), Some(client_secret), Some(api_url)) => Some(PayPalConfig {
                client_id,
                client_secret,
                api_url: api_url.trim_end_matches('/').to_string(),
            }),
            (None, None, None) => None,
            _ => {
                warn!("PayPal is partially configured; PAYPAL_CLIENT_ID, PAYPAL_CLIENT_SECRET and PAYPAL_API_URL are all required. Payments are disabled.");
                None
            }
        }
    }
}

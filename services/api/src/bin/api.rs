//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, GoogleIdentityProvider, OpenAiContentAdapter, PayPalGateway},
    config::Config,
    error::ApiError,
    web::{
        router,
        state::{AppState, Collaborators},
    },
};
use async_openai::{config::OpenAIConfig, Client};
use blogsmith_core::MemoryStore;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize External Collaborators ---
    // Each one is optional; a missing credential disables its feature.
    let http = reqwest::Client::builder()
        .user_agent(concat!("blogsmith/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

    let mut collaborators = Collaborators::default();

    match &config.openai_api_key {
        Some(api_key) => {
            let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
            if let Some(api_base) = &config.openai_api_base {
                openai_config = openai_config.with_api_base(api_base);
            }
            collaborators.generator = Some(Arc::new(OpenAiContentAdapter::new(
                Client::with_config(openai_config),
                config.ideas_model.clone(),
                config.article_model.clone(),
                config.keywords_model.clone(),
            )));
            info!(
                "Content generation enabled (ideas: {}, article: {}, keywords: {})",
                config.ideas_model, config.article_model, config.keywords_model
            );
        }
        None => warn!("OPENAI_API_KEY is not set. Content generation is disabled."),
    }

    match &config.paypal {
        Some(paypal) => {
            collaborators.gateway = Some(Arc::new(PayPalGateway::new(http.clone(), paypal.clone())));
            info!("Payments enabled via {}", paypal.api_url);
        }
        None => warn!("PayPal credentials are not set. Payments are disabled."),
    }

    match &config.google_client_id {
        Some(client_id) => {
            collaborators.federated = Some(Arc::new(GoogleIdentityProvider::new(
                http.clone(),
                client_id.clone(),
            )));
            info!("Google sign-in enabled.");
        }
        None => warn!("GOOGLE_CLIENT_ID is not set. Google sign-in is disabled."),
    }

    // --- 3. Connect to the Store & Build the Shared AppState ---
    let app_state = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            AppState::new(config.clone(), db_adapter, collaborators)
        }
        None => {
            warn!("DATABASE_URL is not set. Using the in-memory store; data is lost on restart.");
            AppState::new(config.clone(), Arc::new(MemoryStore::new()), collaborators)
        }
    };

    // --- 4. Start the Server ---
    let app = router(Arc::new(app_state));
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

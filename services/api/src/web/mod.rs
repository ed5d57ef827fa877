pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

pub use middleware::require_auth;
pub use ws_handler::ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use blogsmith_core::ServiceError;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use self::rest::ApiDoc;
use self::state::AppState;

/// Converts a failed user operation into the status and message sent to the client.
pub fn service_error(e: ServiceError) -> (StatusCode, String) {
    let status = match &e {
        ServiceError::Disabled(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Authentication(_) => StatusCode::UNAUTHORIZED,
        ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ServiceError::QuotaExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
        ServiceError::Generation(_) | ServiceError::Payment(_) => StatusCode::BAD_GATEWAY,
        ServiceError::AccountMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    if status.is_server_error() && !e.is_retryable() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request failed: {}", e);
    }
    (status, e.to_string())
}

/// Builds the complete application: REST and WebSocket routes plus the Swagger UI.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    let cors = match state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            warn!("Ignoring invalid CORS_ORIGIN '{}'", state.config.cors_origin);
            cors
        }
    };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/status", get(rest::status_handler))
        .route("/plans", get(rest::plans_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/federated", post(auth::federated_login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/account", get(rest::account_handler))
        .route("/posts", get(rest::list_posts_handler).post(rest::create_post_handler))
        .route("/posts/{id}", get(rest::get_post_handler))
        .route("/ideas", post(rest::generate_ideas_handler))
        .route("/billing/orders", post(rest::create_order_handler))
        .route(
            "/billing/orders/{order_id}/capture",
            post(rest::capture_order_handler),
        )
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .with_state(state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blogsmith_core::UserId;

    #[test]
    fn quota_exhaustion_maps_to_payment_required() {
        let (status, message) = service_error(ServiceError::QuotaExceeded { used: 3, limit: 3 });
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert!(message.contains("3 of your 3"));
    }

    #[test]
    fn missing_account_is_an_internal_error() {
        let (status, _) = service_error(ServiceError::AccountMissing(UserId::new("ghost")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let (status, _) = service_error(ServiceError::Disabled("Payments"));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

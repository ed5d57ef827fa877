//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use blogsmith_core::{ports::PortError, SessionContext};
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::state::AppState;

/// Name of the cookie carrying the auth session token.
pub const SESSION_COOKIE: &str = "session";

/// Reads the auth session token from the `Cookie` header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

/// Middleware that validates the auth session cookie.
///
/// If valid, inserts a `SessionContext` into the request extensions for
/// handlers to use. If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = session_token(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let user_id = state
        .auth_sessions
        .validate_auth_session(&token)
        .await
        .map_err(|e| match e {
            PortError::Unauthorized | PortError::NotFound(_) => {
                debug!("Rejected an unknown or expired session");
                StatusCode::UNAUTHORIZED
            }
            other => {
                error!("Failed to validate auth session: {:?}", other);
                StatusCode::SERVICE_UNAVAILABLE
            }
        })?;

    req.extensions_mut().insert(SessionContext { token, user_id });

    Ok(next.run(req).await)
}

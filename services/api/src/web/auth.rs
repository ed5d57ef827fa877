//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for signup, login, Google sign-in and logout.
//!
//! Every successful sign-in makes sure the user's account record exists
//! (Free plan on the first one) before the session cookie is issued.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use blogsmith_core::{
    ports::{Credentials, PortError},
    Identity, ServiceError,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{
    middleware::{session_token, SESSION_COOKIE},
    rest::AccountView,
    service_error,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FederatedLoginRequest {
    /// The ID token returned by Google Identity Services.
    pub id_token: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: String,
    pub email: Option<String>,
    pub account: AccountView,
}

//=========================================================================================
// Session Issuing
//=========================================================================================

/// Creates the account if needed, stores a new auth session and builds the
/// cookie that carries it.
async fn establish_session(
    state: &AppState,
    identity: Identity,
) -> Result<(String, AuthResponse), (StatusCode, String)> {
    let account = state
        .accounts
        .ensure_account(&identity)
        .await
        .map_err(service_error)?;

    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = Duration::days(state.config.session_ttl_days);
    let expires_at = Utc::now() + ttl;

    state
        .auth_sessions
        .create_auth_session(&auth_session_id, &identity.uid, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Failed to create session".to_string())
        })?;

    let cookie = format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        auth_session_id,
        ttl.num_seconds()
    );

    let response = AuthResponse {
        user_id: identity.uid.to_string(),
        email: identity.email,
        account: account.into(),
    };
    Ok((cookie, response))
}

fn validate_signup(req: &SignupRequest) -> Result<(), (StatusCode, String)> {
    let email = req.email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(service_error(ServiceError::InvalidInput(
            "Please enter a valid email address.".to_string(),
        )));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(service_error(ServiceError::InvalidInput(format!(
            "Passwords must be at least {} characters long.",
            MIN_PASSWORD_LEN
        ))));
    }
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user with email and password
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    validate_signup(&req)?;

    let credentials = Credentials {
        email: req.email.trim().to_string(),
        password: req.password,
    };
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let identity = state
        .identity
        .sign_up(&credentials, display_name)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => (
                StatusCode::CONFLICT,
                "An account with this email already exists.".to_string(),
            ),
            other => {
                error!("Failed to create user: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user".to_string())
            }
        })?;
    info!("New user {} signed up", identity.uid);

    let (cookie, response) = establish_session(&state, identity).await?;
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let credentials = Credentials {
        email: req.email,
        password: req.password,
    };

    let identity = state.identity.sign_in(&credentials).await.map_err(|e| match e {
        PortError::Unauthorized => service_error(ServiceError::Authentication(
            "Invalid email or password".to_string(),
        )),
        other => {
            error!("Failed to sign in: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
        }
    })?;

    let (cookie, response) = establish_session(&state, identity).await?;
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/federated - Sign in with a Google ID token
#[utoipa::path(
    post,
    path = "/auth/federated",
    request_body = FederatedLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "The token was rejected"),
        (status = 503, description = "Google sign-in is not configured")
    )
)]
pub async fn federated_login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FederatedLoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let provider = state
        .federated
        .as_ref()
        .ok_or_else(|| service_error(ServiceError::Disabled("Google sign-in")))?;

    let identity = provider
        .sign_in_with_token(&req.id_token)
        .await
        .map_err(|e| match e {
            PortError::Unauthorized => service_error(ServiceError::Authentication(
                "Google sign-in was rejected".to_string(),
            )),
            other => {
                warn!("Google sign-in failed: {:?}", other);
                service_error(ServiceError::Authentication(
                    "Google sign-in is temporarily unavailable".to_string(),
                ))
            }
        })?;

    let (cookie, response) = establish_session(&state, identity).await?;
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let auth_session_id = session_token(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .auth_sessions
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
        })?;

    // Live connections of this session are told the user signed out.
    state.session_watch.end(auth_session_id);

    let cookie = format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}

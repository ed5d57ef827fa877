//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{auth, service_error, state::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use blogsmith_core::{
    Account, BlogIdea, Keyword, Plan, PlanCatalog, Post, ServiceError, SessionContext,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        status_handler,
        plans_handler,
        account_handler,
        list_posts_handler,
        get_post_handler,
        generate_ideas_handler,
        create_post_handler,
        create_order_handler,
        capture_order_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::federated_login_handler,
        auth::logout_handler,
    ),
    components(
        schemas(
            StatusResponse, FeatureFlags, PlanView, AccountView, SubscriptionView,
            PostView, KeywordView, IdeasRequest, IdeasResponse, IdeaView,
            CreatePostRequest, CreateOrderRequest, OrderResponse, CaptureOrderRequest,
            auth::SignupRequest, auth::LoginRequest, auth::FederatedLoginRequest,
            auth::AuthResponse,
        )
    ),
    tags(
        (name = "Blogsmith API", description = "Blog idea and article generation with metered plans.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// Which optional features this server has credentials for.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub password_sign_in: bool,
    pub federated_sign_in: bool,
    pub generation: bool,
    pub payments: bool,
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub features: FeatureFlags,
    /// Messages to show while a feature is disabled.
    pub banners: Vec<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    pub plan: String,
    pub price: Option<String>,
    pub currency: Option<String>,
    pub generations_limit: u32,
}

#[derive(Serialize, ToSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub plan: String,
    pub status: String,
    pub generations_used: u32,
    pub generations_limit: u32,
    pub lifetime_generations: u64,
}

#[derive(Serialize, ToSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub subscription: SubscriptionView,
    pub version: u64,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        let sub = account.subscription;
        Self {
            user_id: account.user_id.to_string(),
            email: account.email,
            display_name: account.display_name,
            photo_url: account.photo_url,
            subscription: SubscriptionView {
                plan: sub.plan.to_string(),
                status: sub.status.as_str().to_string(),
                generations_used: sub.generations_used,
                generations_limit: sub.generations_limit,
                lifetime_generations: sub.lifetime_generations,
            },
            version: account.version,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct KeywordView {
    pub keyword: String,
    pub explanation: String,
}

impl From<Keyword> for KeywordView {
    fn from(k: Keyword) -> Self {
        Self {
            keyword: k.keyword,
            explanation: k.explanation,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub outline: String,
    pub full_content: String,
    pub keywords: Vec<KeywordView>,
    pub created_at: DateTime<Utc>,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            title: post.title,
            outline: post.outline,
            full_content: post.full_content,
            keywords: post.keywords.into_iter().map(KeywordView::from).collect(),
            created_at: post.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct IdeasRequest {
    pub topic: String,
    #[serde(default)]
    pub audience: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct IdeaView {
    pub title: String,
    pub outline: String,
}

#[derive(Serialize, ToSchema)]
pub struct IdeasResponse {
    pub ideas: Vec<IdeaView>,
}

impl From<Vec<BlogIdea>> for IdeasResponse {
    fn from(ideas: Vec<BlogIdea>) -> Self {
        Self {
            ideas: ideas
                .into_iter()
                .map(|i| IdeaView {
                    title: i.title,
                    outline: i.outline,
                })
                .collect(),
        }
    }
}

/// The idea to expand into a full post.
#[derive(Deserialize, ToSchema)]
pub struct CreatePostRequest {
    pub title: String,
    pub outline: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    /// `Monthly` or `Annual`.
    pub plan: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CaptureOrderRequest {
    /// The plan the order was created for.
    pub plan: String,
}

fn parse_plan(plan: &str) -> Result<Plan, (StatusCode, String)> {
    plan.parse::<Plan>().map_err(|_| {
        service_error(ServiceError::InvalidInput(format!(
            "Unknown plan '{}'. Choose Monthly or Annual.",
            plan
        )))
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Report which features are enabled, with a banner for each disabled one.
#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, description = "Feature availability", body = StatusResponse))
)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let features = FeatureFlags {
        password_sign_in: true,
        federated_sign_in: state.federated.is_some(),
        generation: state.generation.is_some(),
        payments: state.billing.is_some(),
    };

    let mut banners = Vec::new();
    if !features.generation {
        banners.push(
            "Content generation is disabled because no OPENAI_API_KEY is configured.".to_string(),
        );
    }
    if !features.payments {
        banners.push(
            "Payments are disabled because PayPal credentials are not configured. Plan upgrades are unavailable."
                .to_string(),
        );
    }
    if !features.federated_sign_in {
        banners.push("Google sign-in is disabled because no GOOGLE_CLIENT_ID is configured.".to_string());
    }

    Json(StatusResponse { features, banners })
}

/// List the plans with their prices and generation allowances.
#[utoipa::path(
    get,
    path = "/plans",
    responses((status = 200, description = "The plan catalogue", body = Vec<PlanView>))
)]
pub async fn plans_handler() -> Json<Vec<PlanView>> {
    let plans = PlanCatalog::all()
        .iter()
        .map(|terms| PlanView {
            plan: terms.plan.to_string(),
            price: terms.price.map(|p| p.amount.to_string()),
            currency: terms.price.map(|p| p.currency.to_string()),
            generations_limit: terms.generations_limit,
        })
        .collect();
    Json(plans)
}

/// Fetch the signed-in user's account and usage counters.
#[utoipa::path(
    get,
    path = "/account",
    responses(
        (status = 200, description = "The current account", body = AccountView),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn account_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<AccountView>, (StatusCode, String)> {
    let account = state
        .accounts
        .account(&session.user_id)
        .await
        .map_err(service_error)?;
    Ok(Json(account.into()))
}

/// List the user's posts, newest first.
#[utoipa::path(
    get,
    path = "/posts",
    responses(
        (status = 200, description = "The user's posts", body = Vec<PostView>),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list_posts_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<Vec<PostView>>, (StatusCode, String)> {
    let posts = state
        .accounts
        .posts(&session.user_id)
        .await
        .map_err(service_error)?;
    Ok(Json(posts.into_iter().map(PostView::from).collect()))
}

/// Fetch one of the user's posts.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "The post id")),
    responses(
        (status = 200, description = "The post", body = PostView),
        (status = 404, description = "No such post for this user")
    )
)]
pub async fn get_post_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<PostView>, (StatusCode, String)> {
    let post = state
        .accounts
        .post(&session.user_id, id)
        .await
        .map_err(service_error)?;
    Ok(Json(post.into()))
}

/// Brainstorm blog post ideas for a topic. Nothing is saved.
#[utoipa::path(
    post,
    path = "/ideas",
    request_body = IdeasRequest,
    responses(
        (status = 200, description = "Generated ideas", body = IdeasResponse),
        (status = 400, description = "Missing topic"),
        (status = 502, description = "The content service failed"),
        (status = 503, description = "Content generation is not configured")
    )
)]
pub async fn generate_ideas_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
    Json(req): Json<IdeasRequest>,
) -> Result<Json<IdeasResponse>, (StatusCode, String)> {
    let generation = state
        .generation
        .as_ref()
        .ok_or_else(|| service_error(ServiceError::Disabled("Content generation")))?;

    info!("Generating ideas for user {}", session.user_id);
    let ideas = generation
        .generate_ideas(&req.topic, req.audience.as_deref())
        .await
        .map_err(service_error)?;
    Ok(Json(ideas.into()))
}

/// Write the full post and keywords for an idea, then save it and count it
/// against the plan's allowance.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "The saved post", body = PostView),
        (status = 400, description = "Missing title or outline"),
        (status = 402, description = "No generations left on the current plan"),
        (status = 502, description = "The content service failed"),
        (status = 503, description = "Generation is not configured or the post could not be saved")
    )
)]
pub async fn create_post_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let generation = state
        .generation
        .as_ref()
        .ok_or_else(|| service_error(ServiceError::Disabled("Content generation")))?;

    let post = generation
        .generate_post(&session.user_id, &req.title, &req.outline)
        .await
        .map_err(service_error)?;
    Ok((StatusCode::CREATED, Json(PostView::from(post))))
}

/// Create a payment order for a paid plan.
#[utoipa::path(
    post,
    path = "/billing/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "The provider's order id", body = OrderResponse),
        (status = 400, description = "Unknown or free plan"),
        (status = 502, description = "The payment provider failed"),
        (status = 503, description = "Payments are not configured")
    )
)]
pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, (StatusCode, String)> {
    let billing = state
        .billing
        .as_ref()
        .ok_or_else(|| service_error(ServiceError::Disabled("Payments")))?;
    let plan = parse_plan(&req.plan)?;

    info!("User {} is ordering the {} plan", session.user_id, plan);
    let order_id = billing.create_order(plan).await.map_err(service_error)?;
    Ok(Json(OrderResponse { order_id }))
}

/// Capture an approved order and move the account onto the purchased plan.
#[utoipa::path(
    post,
    path = "/billing/orders/{order_id}/capture",
    params(("order_id" = String, Path, description = "The provider's order id")),
    request_body = CaptureOrderRequest,
    responses(
        (status = 200, description = "The upgraded account", body = AccountView),
        (status = 400, description = "Unknown or free plan"),
        (status = 502, description = "The payment was not completed"),
        (status = 503, description = "Payments are not configured")
    )
)]
pub async fn capture_order_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
    Path(order_id): Path<String>,
    Json(req): Json<CaptureOrderRequest>,
) -> Result<Json<AccountView>, (StatusCode, String)> {
    let billing = state
        .billing
        .as_ref()
        .ok_or_else(|| service_error(ServiceError::Disabled("Payments")))?;
    let plan = parse_plan(&req.plan)?;

    let account = billing
        .capture_and_upgrade(&session.user_id, plan, &order_id)
        .await
        .map_err(service_error)?;
    Ok(Json(account.into()))
}

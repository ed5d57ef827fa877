use std::sync::Arc;

use api_lib::{
    config::Config,
    web::{
        router,
        state::{AppState, Collaborators},
    },
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use blogsmith_core::{
    ports::{
        CaptureOutcome, CaptureStatus, ContentGenerationService, PaymentGateway, PortError,
        PortResult, Price,
    },
    BlogIdea, Keyword, MemoryStore, SessionContext, UserId,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

//=========================================================================================
// Stub Collaborators
//=========================================================================================

struct StubGenerator {
    fail_keywords: bool,
}

#[async_trait]
impl ContentGenerationService for StubGenerator {
    async fn generate_ideas(&self, topic: &str, audience: Option<&str>) -> PortResult<Vec<BlogIdea>> {
        let audience = audience.unwrap_or("everyone");
        Ok((1..=4)
            .map(|n| BlogIdea {
                title: format!("{} tip #{} for {}", topic, n, audience),
                outline: format!("Intro, tip {}, conclusion", n),
            })
            .collect())
    }

    async fn generate_article(&self, title: &str, _outline: &str) -> PortResult<String> {
        Ok(format!("# {}\n\nA long and helpful article.", title))
    }

    async fn generate_keywords(&self, _title: &str, _outline: &str) -> PortResult<Vec<Keyword>> {
        if self.fail_keywords {
            return Err(PortError::Unexpected("keyword model timed out".to_string()));
        }
        Ok(vec![Keyword {
            keyword: "zero waste kitchen".to_string(),
            explanation: "Low competition and steady search volume.".to_string(),
        }])
    }
}

/// Completes every capture at the Monthly price.
struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(&self, price: Price) -> PortResult<String> {
        Ok(format!("ORDER-{}", price.amount))
    }

    async fn capture_order(&self, order_id: &str) -> PortResult<CaptureOutcome> {
        if order_id == "DECLINED" {
            return Ok(CaptureOutcome {
                status: CaptureStatus::Other("INSTRUMENT_DECLINED".to_string()),
                detail: Some("The card was declined.".to_string()),
                amount: None,
            });
        }
        Ok(CaptureOutcome {
            status: CaptureStatus::Completed,
            detail: None,
            amount: Some("9.00".to_string()),
        })
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn build_state(collaborators: Collaborators) -> Arc<AppState> {
    Arc::new(AppState::new(
        Arc::new(Config::default()),
        Arc::new(MemoryStore::new()),
        collaborators,
    ))
}

fn full_collaborators(fail_keywords: bool) -> Collaborators {
    Collaborators {
        generator: Some(Arc::new(StubGenerator { fail_keywords })),
        gateway: Some(Arc::new(StubGateway)),
        federated: None,
    }
}

fn spawn_app() -> Router {
    router(build_state(full_collaborators(false)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Signs up and returns the `session=...` pair to send back as a cookie.
async fn signup(app: &Router, email: &str) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/signup",
            None,
            json!({ "email": email, "password": "correct-horse", "displayName": "Writer" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn status_reports_disabled_features() {
    let app = router(build_state(Collaborators::default()));

    let (status, body) = send(&app, get("/status", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["features"]["passwordSignIn"], true);
    assert_eq!(body["features"]["generation"], false);
    assert_eq!(body["features"]["payments"], false);
    assert_eq!(body["features"]["federatedSignIn"], false);
    assert_eq!(body["banners"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn disabled_features_answer_service_unavailable() {
    let app = router(build_state(Collaborators::default()));
    let cookie = signup(&app, "degraded@example.com").await;

    let (status, _) = send(
        &app,
        post_json("/ideas", Some(&cookie), json!({ "topic": "gardening" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(
        &app,
        post_json("/billing/orders", Some(&cookie), json!({ "plan": "Monthly" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(
        &app,
        post_json("/auth/federated", None, json!({ "idToken": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // Reading the account still works.
    let (status, _) = send(&app, get("/account", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn plans_come_from_the_catalogue() {
    let app = spawn_app();

    let (status, body) = send(&app, get("/plans", None)).await;

    assert_eq!(status, StatusCode::OK);
    let plans = body.as_array().unwrap();
    assert_eq!(plans.len(), 3);
    assert_eq!(plans[0]["plan"], "Free");
    assert_eq!(plans[0]["price"], Value::Null);
    assert_eq!(plans[0]["generationsLimit"], 3);
    assert_eq!(plans[1]["plan"], "Monthly");
    assert_eq!(plans[1]["price"], "9.00");
    assert_eq!(plans[2]["price"], "49.00");
    assert_eq!(plans[2]["generationsLimit"], 9999);
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = spawn_app();

    let (status, _) = send(&app, get("/account", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get("/posts", Some("session=not-a-real-token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_sign_up_creates_a_free_account() {
    let app = spawn_app();
    let cookie = signup(&app, "new@example.com").await;

    let (status, body) = send(&app, get("/account", Some(&cookie))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "new@example.com");
    assert_eq!(body["displayName"], "Writer");
    let subscription = &body["subscription"];
    assert_eq!(subscription["plan"], "Free");
    assert_eq!(subscription["status"], "active");
    assert_eq!(subscription["generationsUsed"], 0);
    assert_eq!(subscription["generationsLimit"], 3);
    assert_eq!(subscription["lifetimeGenerations"], 0);
}

#[tokio::test]
async fn login_checks_credentials_and_keeps_the_account() {
    let app = spawn_app();
    let cookie = signup(&app, "writer@example.com").await;
    let (_, before) = send(&app, get("/account", Some(&cookie))).await;

    let (status, _) = send(
        &app,
        post_json(
            "/auth/signup",
            None,
            json!({ "email": "Writer@Example.com", "password": "another-one" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        post_json(
            "/auth/login",
            None,
            json!({ "email": "writer@example.com", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        post_json(
            "/auth/login",
            None,
            json!({ "email": "writer@example.com", "password": "correct-horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], before["userId"]);
    assert_eq!(body["account"]["version"], before["version"]);
}

#[tokio::test]
async fn ideas_are_returned_without_being_saved() {
    let app = spawn_app();
    let cookie = signup(&app, "ideas@example.com").await;

    let (status, body) = send(
        &app,
        post_json(
            "/ideas",
            Some(&cookie),
            json!({ "topic": "sustainable living", "audience": "beginners" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let ideas = body["ideas"].as_array().unwrap();
    assert!((3..=7).contains(&ideas.len()));
    for idea in ideas {
        assert!(!idea["title"].as_str().unwrap().is_empty());
        assert!(!idea["outline"].as_str().unwrap().is_empty());
    }

    let (_, posts) = send(&app, get("/posts", Some(&cookie))).await;
    assert!(posts.as_array().unwrap().is_empty());

    let (status, _) = send(&app, post_json("/ideas", Some(&cookie), json!({ "topic": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn posts_are_metered_until_the_free_quota_runs_out() {
    let app = spawn_app();
    let cookie = signup(&app, "quota@example.com").await;

    let mut ids = Vec::new();
    for n in 1..=3 {
        let (status, body) = send(
            &app,
            post_json(
                "/posts",
                Some(&cookie),
                json!({ "title": format!("Post {}", n), "outline": "Intro, body, end" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["keywords"][0]["keyword"], "zero waste kitchen");
        ids.push(body["id"].as_str().unwrap().to_string());
    }

    let (status, _) = send(
        &app,
        post_json(
            "/posts",
            Some(&cookie),
            json!({ "title": "One too many", "outline": "Intro, body, end" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let (_, account) = send(&app, get("/account", Some(&cookie))).await;
    assert_eq!(account["subscription"]["generationsUsed"], 3);
    assert_eq!(account["subscription"]["lifetimeGenerations"], 3);

    let (_, posts) = send(&app, get("/posts", Some(&cookie))).await;
    let titles: Vec<_> = posts
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Post 3", "Post 2", "Post 1"]);

    let (status, post) = send(&app, get(&format!("/posts/{}", ids[0]), Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["title"], "Post 1");
}

#[tokio::test]
async fn posts_of_other_users_are_not_found() {
    let app = spawn_app();
    let owner = signup(&app, "owner@example.com").await;
    let other = signup(&app, "other@example.com").await;

    let (_, post) = send(
        &app,
        post_json("/posts", Some(&owner), json!({ "title": "Mine", "outline": "Private" })),
    )
    .await;
    let uri = format!("/posts/{}", post["id"].as_str().unwrap());

    let (status, _) = send(&app, get(&uri, Some(&other))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_keyword_generation_saves_nothing() {
    let app = router(build_state(full_collaborators(true)));
    let cookie = signup(&app, "flaky@example.com").await;

    let (status, _) = send(
        &app,
        post_json("/posts", Some(&cookie), json!({ "title": "T", "outline": "O" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (_, account) = send(&app, get("/account", Some(&cookie))).await;
    assert_eq!(account["subscription"]["generationsUsed"], 0);
    let (_, posts) = send(&app, get("/posts", Some(&cookie))).await;
    assert!(posts.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn captured_payment_upgrades_the_plan_but_keeps_usage() {
    let app = spawn_app();
    let cookie = signup(&app, "buyer@example.com").await;
    send(
        &app,
        post_json("/posts", Some(&cookie), json!({ "title": "T", "outline": "O" })),
    )
    .await;

    let (status, order) = send(
        &app,
        post_json("/billing/orders", Some(&cookie), json!({ "plan": "Monthly" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["orderId"], "ORDER-9.00");

    let (status, account) = send(
        &app,
        post_json(
            "/billing/orders/ORDER-9.00/capture",
            Some(&cookie),
            json!({ "plan": "Monthly" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let subscription = &account["subscription"];
    assert_eq!(subscription["plan"], "Monthly");
    assert_eq!(subscription["status"], "active");
    assert_eq!(subscription["generationsLimit"], 9999);
    assert_eq!(subscription["generationsUsed"], 1);
    assert_eq!(subscription["lifetimeGenerations"], 1);
}

#[tokio::test]
async fn declined_and_invalid_orders_leave_the_plan_alone() {
    let app = spawn_app();
    let cookie = signup(&app, "declined@example.com").await;

    let (status, body) = send(
        &app,
        post_json(
            "/billing/orders/DECLINED/capture",
            Some(&cookie),
            json!({ "plan": "Monthly" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, Value::Null);

    let (status, _) = send(
        &app,
        post_json("/billing/orders", Some(&cookie), json!({ "plan": "Free" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json("/billing/orders", Some(&cookie), json!({ "plan": "Lifetime" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, account) = send(&app, get("/account", Some(&cookie))).await;
    assert_eq!(account["subscription"]["plan"], "Free");
}

#[tokio::test]
async fn monthly_payment_cannot_buy_the_annual_plan() {
    let app = spawn_app();
    let cookie = signup(&app, "bargain@example.com").await;

    let (_, order) = send(
        &app,
        post_json("/billing/orders", Some(&cookie), json!({ "plan": "Monthly" })),
    )
    .await;
    let order_id = order["orderId"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        post_json(
            &format!("/billing/orders/{}/capture", order_id),
            Some(&cookie),
            json!({ "plan": "Annual" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (_, account) = send(&app, get("/account", Some(&cookie))).await;
    assert_eq!(account["subscription"]["plan"], "Free");
    assert_eq!(account["subscription"]["generationsLimit"], 3);
}

#[tokio::test]
async fn logout_ends_the_session_and_notifies_observers() {
    let state = build_state(full_collaborators(false));
    let app = router(state.clone());
    let cookie = signup(&app, "leaving@example.com").await;
    let token = cookie.trim_start_matches("session=").to_string();

    let (_, account) = send(&app, get("/account", Some(&cookie))).await;
    let mut observer = state.session_watch.observe(&SessionContext {
        token: token.clone(),
        user_id: UserId::new(account["userId"].as_str().unwrap()),
    });

    let response = app
        .clone()
        .oneshot(post_json("/auth/logout", Some(&cookie), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    assert!(observer.borrow_and_update().is_none());

    let (status, _) = send(&app, get("/account", Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

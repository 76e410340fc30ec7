//! End-to-end flows through the HTTP router over the in-memory store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{
        Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
    },
    response::Response,
};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sesame::api::{AuthConfig, AuthState, router};
use sesame::credentials::notify::{EmailMessage, EmailSender};
use sesame::credentials::password::Argon2Hasher;
use sesame::credentials::store::memory::LocalUser;
use sesame::credentials::store::MemoryCredentialStore;
use sesame::credentials::{EventBus, ManualClock, TokenConfig, UserRecord};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl EmailSender for Outbox {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("outbox poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

impl Outbox {
    fn last_token(&self) -> Result<String> {
        let sent = self
            .sent
            .lock()
            .map_err(|_| anyhow::anyhow!("outbox poisoned"))?;
        let message = sent.last().context("no mail sent")?;
        let payload: Value = serde_json::from_str(&message.payload_json)?;
        let link = payload["link"].as_str().context("link missing")?;
        let (_, token) = link.split_once("#token=").context("token missing")?;
        Ok(token.to_string())
    }

    fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

struct Harness {
    app: Router,
    state: Arc<AuthState>,
    store: Arc<MemoryCredentialStore>,
    clock: Arc<ManualClock>,
    outbox: Arc<Outbox>,
}

impl Harness {
    fn new() -> Result<Self> {
        let store = Arc::new(MemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
                .single()
                .context("valid start instant")?,
        ));
        let outbox = Arc::new(Outbox::default());
        let config = AuthConfig::new("https://app.example.com".to_string()).with_tokens(
            TokenConfig::new()
                .with_access_token_ttl_seconds(60)
                .with_refresh_token_ttl_seconds(600),
        );
        let state = Arc::new(AuthState::new(
            config,
            store.clone(),
            clock.clone(),
            Argon2Hasher::with_cost(8 * 1024, 1, 1)?,
            outbox.clone(),
            EventBus::default(),
        ));
        Ok(Self {
            app: router(state.clone()),
            state,
            store,
            clock,
            outbox,
        })
    }

    async fn user(&self, email: &str) -> UserRecord {
        self.store.insert_user(LocalUser::new(email)).await
    }

    async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.app.clone().oneshot(request).await?)
    }
}

fn get(uri: &str, bearer: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    Ok(builder.body(Body::empty())?)
}

fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?)
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn health_reports_store_status() -> Result<()> {
    let harness = Harness::new()?;
    let response = harness.send(get("/health", None)?).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await?;
    assert_eq!(body["name"], "sesame");
    assert_eq!(body["database"], "ok");
    Ok(())
}

#[tokio::test]
async fn session_lifecycle_over_http() -> Result<()> {
    let harness = Harness::new()?;
    let user = harness.user("alice@example.com").await;
    let issued = harness.state.issuer().issue(user.id).await?;
    let access = secrecy::ExposeSecret::expose_secret(&issued.access_token).to_string();
    let refresh = secrecy::ExposeSecret::expose_secret(&issued.refresh_token).to_string();

    let response = harness
        .send(get("/v1/auth/session", Some(&access))?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["id"], user.external_id.to_string());

    // Refresh via cookie rotates the pair.
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/refresh-token")
        .header(COOKIE, format!("refreshToken={refresh}"))
        .body(Body::empty())?;
    let response = harness.send(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
    let body = json_body(response).await?;
    let new_access = body["accessToken"]
        .as_str()
        .context("accessToken missing")?
        .to_string();
    assert_ne!(new_access, access);

    let response = harness
        .send(get("/v1/auth/session", Some(&access))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Logout with the new access token, then it stops resolving.
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/logout")
        .header(AUTHORIZATION, format!("Bearer {new_access}"))
        .body(Body::empty())?;
    let response = harness.send(request).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(harness.store.session_count(user.id).await, 0);

    let response = harness
        .send(get("/v1/auth/session", Some(&new_access))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn access_token_expires_with_the_clock() -> Result<()> {
    let harness = Harness::new()?;
    let user = harness.user("bob@example.com").await;
    let issued = harness.state.issuer().issue(user.id).await?;
    let access = secrecy::ExposeSecret::expose_secret(&issued.access_token).to_string();

    harness.clock.advance(Duration::seconds(59));
    let response = harness
        .send(get("/v1/auth/session", Some(&access))?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    harness.clock.advance(Duration::seconds(1));
    let response = harness
        .send(get("/v1/auth/session", Some(&access))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn missing_credentials_are_unauthorized() -> Result<()> {
    let harness = Harness::new()?;
    let response = harness.send(get("/v1/auth/session", None)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn password_reset_flow() -> Result<()> {
    let harness = Harness::new()?;
    let user = harness.user("carol@example.com").await;

    let response = harness
        .send(post_json(
            "/v1/forgot-password",
            &json!({ "email": "Carol@Example.com" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["message"], "success");
    let token = harness.outbox.last_token()?;

    let response = harness
        .send(get(&format!("/v1/token/{token}"), None)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["email"], "carol@example.com");

    let before = harness.store.password_hash(user.id).await;
    let body = json!({ "token": token, "password": "n3w-secret" });
    let response = harness.send(post_json("/v1/new-password", &body)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(harness.store.password_hash(user.id).await, before);

    let login = json!({ "email": "carol@example.com", "password": "n3w-secret" });
    let response = harness.send(post_json("/v1/login", &login)?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Second use of the same token is rejected.
    let response = harness.send(post_json("/v1/new-password", &body)?).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn forgot_password_for_unknown_email_is_silent() -> Result<()> {
    let harness = Harness::new()?;
    let response = harness
        .send(post_json(
            "/v1/forgot-password",
            &json!({ "email": "nobody@example.com" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.outbox.count(), 0);
    Ok(())
}

#[tokio::test]
async fn new_password_validates_input() -> Result<()> {
    let harness = Harness::new()?;

    let response = harness
        .send(post_json(
            "/v1/new-password",
            &json!({ "token": "whatever", "password": "short" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/new-password")
        .body(Body::empty())?;
    let response = harness.send(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn email_verification_flow() -> Result<()> {
    let harness = Harness::new()?;
    let user = harness
        .store
        .insert_user(LocalUser::new("dave@example.com").with_email_verified(false))
        .await;
    let issued = harness.state.issuer().issue(user.id).await?;
    let access = secrecy::ExposeSecret::expose_secret(&issued.access_token).to_string();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/verify-email/request")
        .header(AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())?;
    let response = harness.send(request).await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let token = harness.outbox.last_token()?;

    let body = json!({ "token": token });
    let response = harness.send(post_json("/v1/verify-email", &body)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["email"], "dave@example.com");

    let response = harness.send(post_json("/v1/verify-email", &body)?).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn facebook_login_links_once() -> Result<()> {
    let harness = Harness::new()?;
    let body = json!({ "id": "fb-42", "email": "erin@example.com", "name": "Erin" });

    let response = harness
        .send(post_json("/v1/oauth2/facebook", &body)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
    let first = json_body(response).await?;
    assert_eq!(first["user"]["email"], "erin@example.com");
    assert!(first["accessToken"].as_str().is_some_and(|t| !t.is_empty()));

    let response = harness
        .send(post_json("/v1/oauth2/facebook", &body)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let second = json_body(response).await?;
    assert_eq!(first["user"]["id"], second["user"]["id"]);
    assert_ne!(first["accessToken"], second["accessToken"]);
    assert_eq!(harness.store.links().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn facebook_login_requires_valid_email() -> Result<()> {
    let harness = Harness::new()?;
    let response = harness
        .send(post_json(
            "/v1/oauth2/facebook",
            &json!({ "id": "fb-1", "email": "not-an-email" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(harness.store.links().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn google_login_without_verifier_is_rejected() -> Result<()> {
    let harness = Harness::new()?;
    let response = harness
        .send(post_json("/v1/oauth2/google", &json!({ "token": "abc.def.ghi" }))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.store.links().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn password_login_issues_session() -> Result<()> {
    let harness = Harness::new()?;
    let hash = Argon2Hasher::with_cost(8 * 1024, 1, 1)?.hash("s3cret-pass")?;
    let user = harness
        .store
        .insert_user(LocalUser::new("gina@example.com").with_password_hash(hash))
        .await;

    let response = harness
        .send(post_json(
            "/v1/login",
            &json!({ "email": " Gina@Example.com ", "password": "s3cret-pass" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
    let body = json_body(response).await?;
    assert_eq!(body["user"]["email"], "gina@example.com");
    let access = body["accessToken"]
        .as_str()
        .context("accessToken missing")?
        .to_string();

    let response = harness
        .send(get("/v1/auth/session", Some(&access))?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.store.session_count(user.id).await, 1);
    Ok(())
}

#[tokio::test]
async fn password_login_failures_share_one_response() -> Result<()> {
    let harness = Harness::new()?;
    let hash = Argon2Hasher::with_cost(8 * 1024, 1, 1)?.hash("s3cret-pass")?;
    harness
        .store
        .insert_user(LocalUser::new("hank@example.com").with_password_hash(hash))
        .await;
    harness
        .store
        .insert_user(LocalUser::new("ivy@example.com").without_password())
        .await;

    let attempts = [
        json!({ "email": "hank@example.com", "password": "wrong-pass" }),
        json!({ "email": "nobody@example.com", "password": "s3cret-pass" }),
        json!({ "email": "ivy@example.com", "password": "s3cret-pass" }),
    ];
    for attempt in &attempts {
        let response = harness.send(post_json("/v1/login", attempt)?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 0);
        let bytes = response.into_body().collect().await?.to_bytes();
        assert_eq!(bytes.as_ref(), b"Invalid email or password");
    }

    let response = harness
        .send(post_json(
            "/v1/login",
            &json!({ "email": "hank@example.com", "password": "" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

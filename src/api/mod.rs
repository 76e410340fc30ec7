//! HTTP surface for the credential subsystem.

use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

pub mod handlers;

use crate::cli::telemetry::shutdown_tracer;
use crate::credentials::events::spawn_log_observer;
use crate::credentials::notify::LogEmailSender;
use crate::credentials::oauth::GoogleIdTokenVerifier;
use crate::credentials::password::Argon2Hasher;
use crate::credentials::store::PgCredentialStore;
use crate::credentials::{EventBus, SystemClock};
use handlers::{auth, health};

pub use handlers::auth::{AuthConfig, AuthState, Environment};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Google login settings; Google login is disabled when absent.
#[derive(Clone, Debug)]
pub struct GoogleLogin {
    pub client_id: String,
    pub jwks_url: String,
}

/// Routes plus request-id and tracing layers, without CORS.
#[must_use]
pub fn router(auth_state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/v1/login", post(auth::session::login))
        .route("/v1/auth/session", get(auth::session::session))
        .route("/v1/logout", post(auth::session::logout))
        .route("/v1/refresh-token", post(auth::session::refresh))
        .route("/v1/oauth2/google", post(auth::oauth::google))
        .route("/v1/oauth2/facebook", post(auth::oauth::facebook))
        .route("/v1/forgot-password", post(auth::recovery::forgot_password))
        .route("/v1/token/{token}", get(auth::recovery::check_reset_token))
        .route("/v1/new-password", post(auth::recovery::new_password))
        .route("/v1/verify-email", post(auth::recovery::verify_email))
        .route(
            "/v1/verify-email/request",
            post(auth::recovery::request_verification),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID_HEADER,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth_state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: SecretString,
    auth_config: AuthConfig,
    hasher: Argon2Hasher,
    google: Option<GoogleLogin>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let clock = Arc::new(SystemClock);
    let events = EventBus::default();
    let observer = spawn_log_observer(&events);

    let mut auth_state = AuthState::new(
        auth_config,
        Arc::new(PgCredentialStore::new(pool)),
        clock.clone(),
        hasher,
        Arc::new(LogEmailSender),
        events,
    );
    if let Some(google) = google {
        let verifier = GoogleIdTokenVerifier::new_remote(google.client_id, &google.jwks_url, clock)?;
        auth_state = auth_state.with_verifier(Arc::new(verifier));
        info!("Google login enabled");
    } else {
        info!("Google login disabled: no client id configured");
    }
    let auth_state = Arc::new(auth_state);

    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = router(auth_state).layer(cors);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    observer.abort();
    shutdown_tracer();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

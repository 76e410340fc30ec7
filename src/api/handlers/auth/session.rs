//! Session endpoints: password login, current identity, refresh, logout.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

use super::cookies::clear_session_cookies;
use super::error::error_response;
use super::login_response;
use super::state::AuthState;
use super::types::{LoginRequest, UserResponse};
use super::validation::{require_email, require_field};
use crate::credentials::AuthError;
use crate::credentials::guard::require_active;

/// Log in with email and password.
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let result = async {
        let email = require_email(&request.email)?;
        // Checked for presence only; the password itself is never trimmed.
        require_field(&request.password, "password")?;
        auth_state.login().login(&email, &request.password).await
    }
    .await;

    match result {
        Ok((session, identity)) => login_response(auth_state.config(), &session, &identity),
        Err(err) => error_response(auth_state.config(), &err),
    }
}

/// Identity behind the presented access token.
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    match auth_state.guard().authenticate(&headers).await {
        Ok(identity) => (StatusCode::OK, Json(UserResponse::from(&identity))).into_response(),
        Err(err) => error_response(auth_state.config(), &err),
    }
}

/// Trade a live refresh token for a brand-new pair.
pub async fn refresh(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let result = async {
        let identity = auth_state.guard().authenticate_refresh(&headers).await?;
        require_active(&identity)?;
        let session = auth_state.issuer().rotate(identity.user_id).await?;
        Ok::<_, AuthError>((session, identity))
    }
    .await;

    match result {
        Ok((session, identity)) => login_response(auth_state.config(), &session, &identity),
        Err(err) => error_response(auth_state.config(), &err),
    }
}

/// End the caller's session. An expired access token may still log itself out.
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let result = async {
        let identity = auth_state.guard().authenticate_logout(&headers).await?;
        require_active(&identity)?;
        auth_state.issuer().revoke(identity.user_id).await?;
        Ok::<_, AuthError>(identity.user_id)
    }
    .await;

    match result {
        Ok(user_id) => {
            info!(user_id, "logout");
            (
                StatusCode::NO_CONTENT,
                clear_session_cookies(auth_state.config()),
            )
                .into_response()
        }
        Err(err) => error_response(auth_state.config(), &err),
    }
}

//! Forgot-password, reset-token check, new-password and email verification.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::error::error_response;
use super::load_user;
use super::state::AuthState;
use super::types::{
    ForgotPasswordRequest, MessageResponse, NewPasswordRequest, VerifyEmailRequest,
};
use super::validation::{require_email, require_field, require_live_token, require_new_password};
use crate::credentials::{AuthError, OneShotPurpose};

fn message(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Always answers `success`, whether or not a mail went out.
pub async fn forgot_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let result = async {
        let email = require_email(&request.email)?;
        auth_state.recovery().request_password_reset(&email).await
    }
    .await;

    match result {
        Ok(()) => message(StatusCode::OK, "success"),
        Err(err) => error_response(auth_state.config(), &err),
    }
}

/// Owner of a live reset token.
pub async fn check_reset_token(
    auth_state: Extension<Arc<AuthState>>,
    Path(token): Path<String>,
) -> Response {
    let result = async {
        let token = require_field(&token, "token")?;
        let user_id = auth_state.recovery().check_reset_token(token).await?;
        load_user(&auth_state, user_id).await
    }
    .await;

    match result {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => error_response(auth_state.config(), &err),
    }
}

/// Set a new password by consuming a reset token.
pub async fn new_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<NewPasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let result = async {
        require_new_password(&request.password)?;
        let token = require_field(&request.token, "token")?;
        let recovery = auth_state.recovery();
        require_live_token(recovery.tokens(), OneShotPurpose::PasswordReset, token).await?;
        let user_id = recovery.reset_password(token, &request.password).await?;
        load_user(&auth_state, user_id).await
    }
    .await;

    match result {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => error_response(auth_state.config(), &err),
    }
}

/// Mark the email verified by consuming a verification token.
pub async fn verify_email(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let result = async {
        let token = require_field(&request.token, "token")?;
        let recovery = auth_state.recovery();
        require_live_token(recovery.tokens(), OneShotPurpose::EmailVerification, token).await?;
        let user_id = recovery.verify_email(token).await?;
        load_user(&auth_state, user_id).await
    }
    .await;

    match result {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => error_response(auth_state.config(), &err),
    }
}

/// Mail a fresh verification link to the caller.
pub async fn request_verification(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let result = async {
        let identity = auth_state.guard().authenticate(&headers).await?;
        auth_state
            .recovery()
            .request_email_verification(identity.user_id)
            .await?;
        Ok::<_, AuthError>(())
    }
    .await;

    match result {
        Ok(()) => message(StatusCode::ACCEPTED, "success"),
        Err(err) => error_response(auth_state.config(), &err),
    }
}

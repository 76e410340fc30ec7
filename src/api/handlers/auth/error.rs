//! `AuthError` -> HTTP response.
//!
//! Bodies are generic; the specific cause has already been logged where the
//! error was raised.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::cookies::clear_session_cookies;
use super::state::AuthConfig;
use crate::credentials::AuthError;

pub(super) const OAUTH_FAILED: &str = "OAuth2 login failed";

fn status_of(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Unauthenticated { .. }
        | AuthError::InvalidCredentials
        | AuthError::ExternalVerificationFailed(_) => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden => StatusCode::FORBIDDEN,
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::Conflict => StatusCode::CONFLICT,
        AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(super) fn error_response(config: &AuthConfig, err: &AuthError) -> Response {
    if let AuthError::Internal(source) = err {
        error!("Auth request failed: {source:#}");
    }
    let status = status_of(err);
    let body = err.to_string();
    if err.clears_session() {
        return (status, clear_session_cookies(config), body).into_response();
    }
    (status, body).into_response()
}

/// OAuth routes hide server-side failures behind the same message as a
/// rejected assertion.
pub(super) fn oauth_error_response(config: &AuthConfig, err: &AuthError) -> Response {
    match err {
        AuthError::Internal(source) => {
            error!("OAuth2 login failed: {source:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, OAUTH_FAILED).into_response()
        }
        _ => error_response(config, err),
    }
}

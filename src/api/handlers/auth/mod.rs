//! Auth handlers and supporting modules.
//!
//! Handlers stay thin: validate the request, call one credential service, and
//! map the outcome to a response. Session pairs travel both as cookies and in
//! the JSON body so browser and API clients can use the same endpoints.

mod cookies;
mod error;
pub(crate) mod oauth;
pub(crate) mod recovery;
pub(crate) mod session;
mod state;
pub(crate) mod types;
mod validation;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub use state::{AuthConfig, AuthState, Environment};

use self::cookies::session_cookies;
use self::types::{LoginResponse, UserResponse};
use crate::credentials::{AuthError, AuthenticatedIdentity, IssuedSession};

fn login_response(
    config: &AuthConfig,
    session: &IssuedSession,
    identity: &AuthenticatedIdentity,
) -> Response {
    let body = LoginResponse::new(session, UserResponse::from(identity));
    (StatusCode::OK, session_cookies(config, session), Json(body)).into_response()
}

async fn load_user(auth_state: &AuthState, user_id: i64) -> Result<UserResponse, AuthError> {
    let user = auth_state
        .store()
        .find_user(user_id)
        .await?
        .ok_or(AuthError::NotFound)?;
    Ok(UserResponse::from(&AuthenticatedIdentity::from(&user)))
}

//! OAuth2 login endpoints.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::error::oauth_error_response;
use super::login_response;
use super::state::AuthState;
use super::types::{FacebookLoginRequest, GoogleLoginRequest};
use super::validation::{require_email, require_field};
use crate::credentials::{AuthError, ExternalAssertion, Provider};

async fn login(
    auth_state: &AuthState,
    provider: Provider,
    assertion: Result<ExternalAssertion, AuthError>,
) -> Response {
    let result = match assertion {
        Ok(assertion) => {
            auth_state
                .linker()
                .login_with_provider(provider, &assertion)
                .await
        }
        Err(err) => Err(err),
    };
    match result {
        Ok((session, identity)) => login_response(auth_state.config(), &session, &identity),
        Err(err) => oauth_error_response(auth_state.config(), &err),
    }
}

/// Log in with a Google ID token.
pub async fn google(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<GoogleLoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let assertion = require_field(&request.token, "token")
        .map(|token| ExternalAssertion::IdToken(token.to_string()));
    login(&auth_state, Provider::Google, assertion).await
}

/// Log in with Facebook identity data the client already verified.
pub async fn facebook(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<FacebookLoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let assertion = require_field(&request.id, "id").and_then(|id| {
        let email = require_email(&request.email)?;
        Ok(ExternalAssertion::Verified {
            external_user_id: id.to_string(),
            email: Some(email),
            name: request.name.clone(),
        })
    });
    login(&auth_state, Provider::Facebook, assertion).await
}

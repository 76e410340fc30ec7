//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::credentials::{AuthenticatedIdentity, IssuedSession};

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GoogleLoginRequest {
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FacebookLoginRequest {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct NewPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

/// Body returned by every endpoint that issues a session pair. Field names
/// match the session cookie names.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

impl LoginResponse {
    pub(super) fn new(session: &IssuedSession, user: UserResponse) -> Self {
        Self {
            access_token: session.access_token.expose_secret().to_string(),
            refresh_token: session.refresh_token.expose_secret().to_string(),
            access_token_expires_at: session.access_token_expires_at,
            refresh_token_expires_at: session.refresh_token_expires_at,
            user,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
}

impl From<&AuthenticatedIdentity> for UserResponse {
    fn from(identity: &AuthenticatedIdentity) -> Self {
        Self {
            id: identity.external_id.to_string(),
            email: identity.email.clone(),
            role: identity.role.as_str().to_string(),
            is_active: identity.is_active,
        }
    }
}

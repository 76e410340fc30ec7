//! Guard pipeline: presented token -> [`AuthenticatedIdentity`] or rejection.
//!
//! Flow Overview: pick a candidate (named cookie first, then `Authorization: Bearer`),
//! hash it, look the session up by the matching digest column, check expiry against
//! the injected clock, then load the owning user. Authorization checks (active flag,
//! role) are separate functions layered on top of the resolved identity.

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};
use std::sync::Arc;
use tracing::{error, warn};

use super::clock::Clock;
use super::codec::hash_token;
use super::error::{AuthError, RejectReason};
use super::models::{AuthenticatedIdentity, Role, SessionCredential, TokenKind};
use super::store::CredentialStore;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

#[must_use]
pub const fn cookie_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Access => ACCESS_TOKEN_COOKIE,
        TokenKind::Refresh => REFRESH_TOKEN_COOKIE,
    }
}

/// Candidate token for `kind`: the named cookie wins over the bearer header.
#[must_use]
pub fn extract_candidate(headers: &HeaderMap, kind: TokenKind) -> Option<String> {
    extract_cookie(headers, cookie_name(kind)).or_else(|| extract_bearer_token(headers))
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[derive(Clone)]
pub struct Guard {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl Guard {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Resolve the access token carried by a request.
    ///
    /// # Errors
    /// `Unauthenticated` for any missing, unknown or expired token; `Internal` on storage failure.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let candidate = extract_candidate(headers, TokenKind::Access);
        self.resolve(TokenKind::Access, candidate.as_deref()).await
    }

    /// Resolve the refresh token carried by a request (refresh endpoint only).
    ///
    /// # Errors
    /// Same as [`Guard::authenticate`]; rejections carry `TokenKind::Refresh` so the
    /// transport layer clears the session cookies.
    pub async fn authenticate_refresh(
        &self,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let candidate = extract_candidate(headers, TokenKind::Refresh);
        self.resolve(TokenKind::Refresh, candidate.as_deref()).await
    }

    /// Resolve the access token for logout. Expiry is not enforced: a known
    /// but expired token may still end its own session.
    ///
    /// # Errors
    /// `Unauthenticated` when the token is missing or unknown.
    pub async fn authenticate_logout(
        &self,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let candidate = extract_candidate(headers, TokenKind::Access);
        let session = self.lookup(TokenKind::Access, candidate.as_deref()).await?;
        self.identity(TokenKind::Access, &session).await
    }

    /// Resolve a raw token of the given kind.
    ///
    /// # Errors
    /// `Unauthenticated` on missing, unknown or expired tokens and on a missing owner.
    pub async fn resolve(
        &self,
        kind: TokenKind,
        token: Option<&str>,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let session = self.lookup(kind, token).await?;
        let now = self.clock.now();
        // Valid strictly before the expiry instant.
        if session.expires_at(kind) <= now {
            return Err(reject(kind, RejectReason::Expired));
        }
        self.identity(kind, &session).await
    }

    async fn lookup(
        &self,
        kind: TokenKind,
        token: Option<&str>,
    ) -> Result<SessionCredential, AuthError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Err(reject(kind, RejectReason::MissingToken));
        };
        let token_hash = hash_token(token);
        match self.store.find_session(kind, &token_hash).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(reject(kind, RejectReason::UnknownToken)),
            Err(err) => {
                error!("Failed to lookup session: {err}");
                Err(err.into())
            }
        }
    }

    async fn identity(
        &self,
        kind: TokenKind,
        session: &SessionCredential,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        match self.store.find_user(session.user_id).await {
            Ok(Some(user)) => Ok(AuthenticatedIdentity::from(&user)),
            Ok(None) => Err(reject(kind, RejectReason::MissingUser)),
            Err(err) => {
                error!(user_id = session.user_id, "Failed to lookup session owner: {err}");
                Err(err.into())
            }
        }
    }
}

fn reject(kind: TokenKind, reason: RejectReason) -> AuthError {
    warn!(token_kind = kind.as_str(), reason = reason.as_str(), "token rejected");
    AuthError::unauthenticated(kind, reason)
}

/// Only active users pass.
///
/// # Errors
/// `Forbidden` for inactive users.
pub fn require_active(identity: &AuthenticatedIdentity) -> Result<(), AuthError> {
    if identity.is_active {
        Ok(())
    } else {
        warn!(user_id = identity.user_id, "inactive user rejected");
        Err(AuthError::Forbidden)
    }
}

/// Only inactive users pass (e.g. activation flows).
///
/// # Errors
/// `Forbidden` for active users.
pub fn require_inactive(identity: &AuthenticatedIdentity) -> Result<(), AuthError> {
    if identity.is_active {
        Err(AuthError::Forbidden)
    } else {
        Ok(())
    }
}

/// Pass when the identity holds one of `allowed`. An empty list allows everyone.
///
/// # Errors
/// `Forbidden` when the role is not allowed.
pub fn require_roles(identity: &AuthenticatedIdentity, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.is_empty() || allowed.contains(&identity.role) {
        Ok(())
    } else {
        warn!(
            user_id = identity.user_id,
            role = identity.role.as_str(),
            "role not allowed"
        );
        Err(AuthError::Forbidden)
    }
}

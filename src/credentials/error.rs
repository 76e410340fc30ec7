//! Error taxonomy for the credential subsystem.
//!
//! `Unauthenticated` deliberately renders the same message whatever went wrong;
//! the specific [`RejectReason`] is only logged.

use thiserror::Error;

use super::models::TokenKind;
use super::oauth::VerificationError;

/// Storage-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (concurrent create or replace).
    #[error("conflicting concurrent write")]
    Conflict,
    /// A referenced row (user, role, provider) is missing.
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.into())
    }
}

/// Why a token was rejected. Logged, never returned to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingToken,
    UnknownToken,
    Expired,
    MissingUser,
}

impl RejectReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingToken => "missing token",
            Self::UnknownToken => "unknown token",
            Self::Expired => "token expired",
            Self::MissingUser => "owning user missing",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthenticated { kind: TokenKind, reason: RejectReason },
    /// Password login failed. Unknown email, missing password and a wrong
    /// password all end here.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("{0}")]
    BadRequest(String),
    #[error("OAuth2 login failed")]
    ExternalVerificationFailed(#[source] VerificationError),
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub const fn unauthenticated(kind: TokenKind, reason: RejectReason) -> Self {
        Self::Unauthenticated { kind, reason }
    }

    /// True when the session can no longer be recovered and the client should
    /// drop both session cookies.
    #[must_use]
    pub const fn clears_session(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated {
                kind: TokenKind::Refresh,
                ..
            }
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::Conflict,
            // Missing seed data or a dangling reference is a server problem.
            StoreError::NotFound(what) => Self::Internal(anyhow::anyhow!("{what} not found")),
            StoreError::Backend(err) => Self::Internal(err),
        }
    }
}

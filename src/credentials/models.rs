use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

/// Role seeded in the `roles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            _ => Err(format!("unknown role: {value}")),
        }
    }
}

/// External identity provider seeded in the `oauth_providers` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            _ => Err(format!("unknown oauth provider: {value}")),
        }
    }
}

/// Which half of a session pair a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Purpose of a one-shot token. Each purpose lives in its own table and allows
/// at most one outstanding token per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OneShotPurpose {
    PasswordReset,
    EmailVerification,
}

impl OneShotPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PasswordReset => "password_reset",
            Self::EmailVerification => "email_verification",
        }
    }

    /// Backing table name. Only ever interpolated from this fixed set.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::PasswordReset => "reset_password_tokens",
            Self::EmailVerification => "verify_email_tokens",
        }
    }
}

/// Local user as seen by the credential subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub external_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub has_password: bool,
}

impl<'r> FromRow<'r, PgRow> for UserRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            role: role.parse().map_err(decode_error)?,
            is_active: row.try_get("is_active")?,
            email_verified: row.try_get("email_verified")?,
            has_password: row.try_get("has_password")?,
        })
    }
}

/// The single live session pair of a user. Only digests are held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub user_id: i64,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SessionCredential {
    #[must_use]
    pub const fn expires_at(&self, kind: TokenKind) -> DateTime<Utc> {
        match kind {
            TokenKind::Access => self.access_token_expires_at,
            TokenKind::Refresh => self.refresh_token_expires_at,
        }
    }

    #[must_use]
    pub fn token_hash(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.access_token_hash,
            TokenKind::Refresh => &self.refresh_token_hash,
        }
    }
}

impl<'r> FromRow<'r, PgRow> for SessionCredential {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            access_token_hash: row.try_get("access_token_hash")?,
            refresh_token_hash: row.try_get("refresh_token_hash")?,
            access_token_expires_at: row.try_get("access_token_expires_at")?,
            refresh_token_expires_at: row.try_get("refresh_token_expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Outstanding password-reset or email-verification token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotToken {
    pub user_id: i64,
    pub purpose: OneShotPurpose,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Binding of an external account to a local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthLink {
    pub user_id: i64,
    pub provider: Provider,
    pub external_user_id: String,
    pub linked_email: String,
}

/// Input for the implicit-registration path of OAuth2 login.
#[derive(Debug, Clone)]
pub struct NewLinkedUser {
    pub provider: Provider,
    pub external_user_id: String,
    pub email: String,
    pub name: String,
    /// Whether the provider vouched for `email`.
    pub email_verified: bool,
    pub role: Role,
}

/// Side effect applied when a one-shot token is consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountMutation {
    /// Replace the local password with an already hashed value.
    SetPasswordHash(String),
    MarkEmailVerified,
}

impl AccountMutation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SetPasswordHash(_) => "set_password_hash",
            Self::MarkEmailVerified => "mark_email_verified",
        }
    }
}

/// Identity derived from a resolved token; never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedIdentity {
    pub user_id: i64,
    pub external_id: Uuid,
    pub is_active: bool,
    pub role: Role,
    pub email: String,
}

impl From<&UserRecord> for AuthenticatedIdentity {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.id,
            external_id: user.external_id,
            is_active: user.is_active,
            role: user.role,
            email: user.email.clone(),
        }
    }
}

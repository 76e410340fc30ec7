//! Persistence seam for sessions, one-shot tokens, users and OAuth2 links.
//!
//! Every mutating method is a single atomic unit: implementations either apply
//! all of it or nothing. Uniqueness of "one live row per user" is enforced by
//! the store (unique constraints), not by callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StoreError;
use super::models::{
    AccountMutation, NewLinkedUser, OneShotPurpose, OneShotToken, Provider, SessionCredential,
    TokenKind, UserRecord,
};

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryCredentialStore;
pub use self::postgres::PgCredentialStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Delete any session of `session.user_id` and insert `session`, atomically.
    async fn replace_session(&self, session: &SessionCredential) -> Result<(), StoreError>;

    /// Delete the session of `user_id`. Returns whether a row existed.
    async fn delete_session(&self, user_id: i64) -> Result<bool, StoreError>;

    /// Look a session up by the digest of one of its tokens. No expiry filter.
    async fn find_session(
        &self,
        kind: TokenKind,
        token_hash: &str,
    ) -> Result<Option<SessionCredential>, StoreError>;

    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError>;

    /// Local-credential user with this email (case-insensitive).
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Stored PHC password hash, `None` for users without local credentials.
    async fn find_password_hash(&self, user_id: i64) -> Result<Option<String>, StoreError>;

    /// Delete any token of the same purpose for the user and insert `token`, atomically.
    async fn replace_one_shot(&self, token: &OneShotToken) -> Result<(), StoreError>;

    /// Token with this digest that is still valid at `now` (`now < expires_at`).
    async fn find_one_shot(
        &self,
        purpose: OneShotPurpose,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OneShotToken>, StoreError>;

    /// Apply `mutation` to the owner and delete the token in one transaction.
    ///
    /// Returns `Ok(None)` when no valid token matched. If the mutation fails
    /// nothing is committed and the token stays valid.
    async fn consume_one_shot(
        &self,
        purpose: OneShotPurpose,
        token_hash: &str,
        now: DateTime<Utc>,
        mutation: &AccountMutation,
    ) -> Result<Option<i64>, StoreError>;

    async fn find_user_by_link(
        &self,
        provider: Provider,
        external_user_id: &str,
    ) -> Result<Option<UserRecord>, StoreError>;

    /// Create a user and its link in one transaction.
    ///
    /// Missing role or provider seed rows yield `NotFound`; losing a race on the
    /// `(provider, external_user_id)` pair yields `Conflict`.
    async fn create_linked_user(
        &self,
        new_user: &NewLinkedUser,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StoreError>;

    /// Cheap liveness probe for `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}

//! Password-reset and email-verification tokens.
//!
//! Each purpose allows one outstanding token per user. Issuing replaces the old
//! one; consuming applies the account mutation and deletes the token in the same
//! transaction, so a token can succeed at most once even under concurrency.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::clock::Clock;
use super::codec::{generate_opaque_token, hash_token};
use super::config::TokenConfig;
use super::error::AuthError;
use super::events::{AuthEvent, EventBus};
use super::models::{AccountMutation, OneShotPurpose, OneShotToken};
use super::store::CredentialStore;

#[derive(Debug)]
pub struct IssuedOneShot {
    pub user_id: i64,
    pub purpose: OneShotPurpose,
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OneShotTokens {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    config: TokenConfig,
    events: EventBus,
}

impl OneShotTokens {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: TokenConfig,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            events,
        }
    }

    /// Issue a token for `purpose`, superseding any outstanding one.
    ///
    /// # Errors
    /// `Internal` on storage failure or unknown user, `Conflict` on a concurrent issue.
    pub async fn issue(
        &self,
        user_id: i64,
        purpose: OneShotPurpose,
    ) -> Result<IssuedOneShot, AuthError> {
        let token = generate_opaque_token().map_err(AuthError::Internal)?;
        let now = self.clock.now();
        let record = OneShotToken {
            user_id,
            purpose,
            token_hash: hash_token(&token),
            expires_at: now + self.config.one_shot_ttl(purpose),
            created_at: now,
        };

        self.store.replace_one_shot(&record).await.map_err(|err| {
            error!(user_id, purpose = purpose.as_str(), "Failed to store one-shot token: {err}");
            AuthError::from(err)
        })?;

        info!(user_id, purpose = purpose.as_str(), "one-shot token issued");
        self.events.publish(AuthEvent::OneShotIssued {
            user_id,
            purpose,
            at: now,
        });

        Ok(IssuedOneShot {
            user_id,
            purpose,
            token: SecretString::from(token),
            expires_at: record.expires_at,
        })
    }

    /// Owner of a still-valid token. Expired and unknown tokens look the same.
    ///
    /// # Errors
    /// `NotFound` when no valid token matches.
    pub async fn find_valid(&self, purpose: OneShotPurpose, token: &str) -> Result<i64, AuthError> {
        if token.is_empty() {
            return Err(AuthError::NotFound);
        }
        let found = self
            .store
            .find_one_shot(purpose, &hash_token(token), self.clock.now())
            .await?;
        found.map(|record| record.user_id).ok_or_else(|| {
            warn!(purpose = purpose.as_str(), "one-shot token not found or expired");
            AuthError::NotFound
        })
    }

    /// Apply `mutation` to the token owner and delete the token, atomically.
    ///
    /// # Errors
    /// `NotFound` when no valid token matches (including one already consumed).
    /// `Internal` when the mutation fails; the token then remains valid.
    pub async fn consume(
        &self,
        purpose: OneShotPurpose,
        token: &str,
        mutation: AccountMutation,
    ) -> Result<i64, AuthError> {
        if token.is_empty() {
            return Err(AuthError::NotFound);
        }
        let now = self.clock.now();
        let consumed = self
            .store
            .consume_one_shot(purpose, &hash_token(token), now, &mutation)
            .await
            .map_err(|err| {
                error!(
                    purpose = purpose.as_str(),
                    mutation = mutation.as_str(),
                    "Failed to consume one-shot token: {err}"
                );
                AuthError::from(err)
            })?;

        let Some(user_id) = consumed else {
            warn!(purpose = purpose.as_str(), "one-shot token not found or expired");
            return Err(AuthError::NotFound);
        };

        info!(
            user_id,
            purpose = purpose.as_str(),
            mutation = mutation.as_str(),
            "one-shot token consumed"
        );
        self.events.publish(AuthEvent::OneShotConsumed {
            user_id,
            purpose,
            at: now,
        });
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::clock::ManualClock;
    use crate::credentials::store::{MemoryCredentialStore, memory::LocalUser};
    use chrono::Duration;
    use secrecy::ExposeSecret;

    fn tokens(store: Arc<MemoryCredentialStore>, clock: Arc<ManualClock>) -> OneShotTokens {
        OneShotTokens::new(store, clock, TokenConfig::new(), EventBus::default())
    }

    #[tokio::test]
    async fn reset_token_expires_after_ttl() -> Result<(), AuthError> {
        let store = Arc::new(MemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = store.insert_user(LocalUser::new("u1@example.com")).await;
        let manager = tokens(store, clock.clone());

        let issued = manager.issue(user.id, OneShotPurpose::PasswordReset).await?;
        assert_eq!(issued.expires_at, clock.now() + Duration::hours(24));
        let raw = issued.token.expose_secret();
        assert_eq!(
            manager.find_valid(OneShotPurpose::PasswordReset, raw).await?,
            user.id
        );

        clock.advance(Duration::hours(25));
        let result = manager.find_valid(OneShotPurpose::PasswordReset, raw).await;
        assert!(matches!(result, Err(AuthError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn expiry_boundary_is_exclusive() -> Result<(), AuthError> {
        let store = Arc::new(MemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = store.insert_user(LocalUser::new("u1@example.com")).await;
        let manager = tokens(store, clock.clone());

        let issued = manager
            .issue(user.id, OneShotPurpose::EmailVerification)
            .await?;
        let raw = issued.token.expose_secret();

        clock.set(issued.expires_at - Duration::milliseconds(1));
        assert!(
            manager
                .find_valid(OneShotPurpose::EmailVerification, raw)
                .await
                .is_ok()
        );

        clock.set(issued.expires_at);
        let result = manager
            .consume(
                OneShotPurpose::EmailVerification,
                raw,
                AccountMutation::MarkEmailVerified,
            )
            .await;
        assert!(matches!(result, Err(AuthError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn consume_is_single_use() -> Result<(), AuthError> {
        let store = Arc::new(MemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = store.insert_user(LocalUser::new("u1@example.com")).await;
        let manager = tokens(store.clone(), clock);

        let issued = manager.issue(user.id, OneShotPurpose::PasswordReset).await?;
        let raw = issued.token.expose_secret();
        let mutation = AccountMutation::SetPasswordHash("$argon2id$new".to_string());

        let owner = manager
            .consume(OneShotPurpose::PasswordReset, raw, mutation.clone())
            .await?;
        assert_eq!(owner, user.id);
        assert_eq!(
            store.password_hash(user.id).await.as_deref(),
            Some("$argon2id$new")
        );

        let again = manager
            .consume(OneShotPurpose::PasswordReset, raw, mutation)
            .await;
        assert!(matches!(again, Err(AuthError::NotFound)));
        let lookup = manager.find_valid(OneShotPurpose::PasswordReset, raw).await;
        assert!(matches!(lookup, Err(AuthError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_consumers_succeed_once() -> Result<(), AuthError> {
        let store = Arc::new(MemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = store.insert_user(LocalUser::new("u1@example.com")).await;
        let manager = tokens(store, clock);

        let issued = manager
            .issue(user.id, OneShotPurpose::EmailVerification)
            .await?;
        let raw = issued.token.expose_secret().to_string();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let raw = raw.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .consume(
                        OneShotPurpose::EmailVerification,
                        &raw,
                        AccountMutation::MarkEmailVerified,
                    )
                    .await
                    .is_ok()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn reissue_supersedes_previous_token() -> Result<(), AuthError> {
        let store = Arc::new(MemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = store.insert_user(LocalUser::new("u1@example.com")).await;
        let manager = tokens(store.clone(), clock);

        let first = manager.issue(user.id, OneShotPurpose::PasswordReset).await?;
        let second = manager.issue(user.id, OneShotPurpose::PasswordReset).await?;
        manager
            .issue(user.id, OneShotPurpose::EmailVerification)
            .await?;

        assert_eq!(
            store
                .one_shot_count(OneShotPurpose::PasswordReset, user.id)
                .await,
            1
        );
        let stale = manager
            .find_valid(OneShotPurpose::PasswordReset, first.token.expose_secret())
            .await;
        assert!(matches!(stale, Err(AuthError::NotFound)));
        assert!(
            manager
                .find_valid(OneShotPurpose::PasswordReset, second.token.expose_secret())
                .await
                .is_ok()
        );
        Ok(())
    }

    #[tokio::test]
    async fn purposes_do_not_cross() -> Result<(), AuthError> {
        let store = Arc::new(MemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = store.insert_user(LocalUser::new("u1@example.com")).await;
        let manager = tokens(store, clock);

        let issued = manager.issue(user.id, OneShotPurpose::PasswordReset).await?;
        let result = manager
            .find_valid(OneShotPurpose::EmailVerification, issued.token.expose_secret())
            .await;
        assert!(matches!(result, Err(AuthError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn failed_mutation_keeps_token_valid() -> Result<(), AuthError> {
        let store = Arc::new(MemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = store.insert_user(LocalUser::new("u1@example.com")).await;
        let manager = tokens(store.clone(), clock);

        let issued = manager.issue(user.id, OneShotPurpose::PasswordReset).await?;
        store.forget_user(user.id).await;

        let result = manager
            .consume(
                OneShotPurpose::PasswordReset,
                issued.token.expose_secret(),
                AccountMutation::SetPasswordHash("x".to_string()),
            )
            .await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
        assert_eq!(
            manager
                .find_valid(OneShotPurpose::PasswordReset, issued.token.expose_secret())
                .await?,
            user.id
        );
        Ok(())
    }
}

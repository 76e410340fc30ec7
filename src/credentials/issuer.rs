//! Session pair issuance, rotation and revocation.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::clock::Clock;
use super::codec::{generate_opaque_token, hash_token};
use super::config::TokenConfig;
use super::error::AuthError;
use super::events::{AuthEvent, EventBus};
use super::models::SessionCredential;
use super::store::CredentialStore;

/// Raw session tokens, handed to the transport layer exactly once.
#[derive(Debug)]
pub struct IssuedSession {
    pub user_id: i64,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    config: TokenConfig,
    events: EventBus,
}

impl SessionIssuer {
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

    /// Create a fresh pair for `user_id`, replacing any session it had.
    ///
    /// # Errors
    /// `Conflict` when a concurrent issue for the same user committed first,
    /// `Internal` on storage failure or an unknown user.
    pub async fn issue(&self, user_id: i64) -> Result<IssuedSession, AuthError> {
        self.replace(user_id, false).await
    }

    /// Refresh always yields a brand-new pair; the old one stops resolving.
    ///
    /// # Errors
    /// Same as [`SessionIssuer::issue`].
    pub async fn rotate(&self, user_id: i64) -> Result<IssuedSession, AuthError> {
        self.replace(user_id, true).await
    }

    /// Drop the session of `user_id`. Revoking an absent session is a no-op.
    ///
    /// # Errors
    /// `Internal` on storage failure.
    pub async fn revoke(&self, user_id: i64) -> Result<(), AuthError> {
        let existed = self.store.delete_session(user_id).await.map_err(|err| {
            error!(user_id, "Failed to revoke session: {err}");
            AuthError::from(err)
        })?;
        debug!(user_id, existed, "session revoked");
        self.events.publish(AuthEvent::SessionRevoked {
            user_id,
            at: self.clock.now(),
        });
        Ok(())
    }

    async fn replace(&self, user_id: i64, rotated: bool) -> Result<IssuedSession, AuthError> {
        let access_token = generate_opaque_token().map_err(AuthError::Internal)?;
        let refresh_token = generate_opaque_token().map_err(AuthError::Internal)?;

        let now = self.clock.now();
        let session = SessionCredential {
            user_id,
            access_token_hash: hash_token(&access_token),
            refresh_token_hash: hash_token(&refresh_token),
            access_token_expires_at: now + self.config.access_token_ttl(),
            refresh_token_expires_at: now + self.config.refresh_token_ttl(),
            created_at: now,
        };

        self.store.replace_session(&session).await.map_err(|err| {
            error!(user_id, rotated, "Failed to store session: {err}");
            AuthError::from(err)
        })?;

        info!(user_id, rotated, "session issued");
        self.events.publish(AuthEvent::SessionIssued {
            user_id,
            rotated,
            at: now,
        });

        Ok(IssuedSession {
            user_id,
            access_token: SecretString::from(access_token),
            refresh_token: SecretString::from(refresh_token),
            access_token_expires_at: session.access_token_expires_at,
            refresh_token_expires_at: session.refresh_token_expires_at,
        })
    }
}

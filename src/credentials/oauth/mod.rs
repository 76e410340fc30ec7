//! OAuth2 account linking.
//!
//! Flow Overview:
//! 1) The provider's [`AssertionVerifier`] turns the client's assertion into an
//!    [`ExternalIdentity`]; a failure is final and never falls back to local login.
//! 2) An existing link for `(provider, external_user_id)` selects the local user.
//! 3) Otherwise a user is registered implicitly with the link attached; missing
//!    email or name are synthesized.
//! 4) The session issuer creates the session pair.

pub mod google;
pub mod jwks;
pub mod jwt;
pub mod passthrough;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::clock::Clock;
use super::error::{AuthError, StoreError};
use super::events::{AuthEvent, EventBus};
use super::issuer::{IssuedSession, SessionIssuer};
use super::models::{AuthenticatedIdentity, NewLinkedUser, Provider, Role, UserRecord};
use super::store::CredentialStore;

pub use self::google::GoogleIdTokenVerifier;
pub use self::jwt::JwtError;
pub use self::passthrough::PassthroughVerifier;

const PLACEHOLDER_EMAIL_DOMAIN: &str = "users.noreply.invalid";

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("invalid id token: {0}")]
    InvalidToken(#[from] JwtError),
    #[error("signing keys unavailable: {0}")]
    KeySet(#[source] anyhow::Error),
    #[error("{0} login is not configured")]
    NotConfigured(Provider),
    #[error("assertion type not accepted by {0}")]
    AssertionMismatch(Provider),
    #[error("assertion carries no subject")]
    MissingSubject,
}

/// What the client presents to prove an external identity.
#[derive(Debug, Clone)]
pub enum ExternalAssertion {
    /// A signed ID token (Google).
    IdToken(String),
    /// Identity data already verified by a trusted backend (Facebook).
    Verified {
        external_user_id: String,
        email: Option<String>,
        name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: Provider,
    pub external_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub email_verified: bool,
}

#[async_trait]
pub trait AssertionVerifier: Send + Sync {
    fn provider(&self) -> Provider;

    async fn verify(
        &self,
        assertion: &ExternalAssertion,
    ) -> Result<ExternalIdentity, VerificationError>;
}

/// Email used when the provider does not share one.
#[must_use]
pub fn placeholder_email(provider: Provider, external_user_id: &str) -> String {
    format!("{provider}-{external_user_id}@{PLACEHOLDER_EMAIL_DOMAIN}")
}

#[derive(Clone)]
pub struct AccountLinker {
    store: Arc<dyn CredentialStore>,
    issuer: SessionIssuer,
    clock: Arc<dyn Clock>,
    events: EventBus,
    verifiers: HashMap<Provider, Arc<dyn AssertionVerifier>>,
}

impl AccountLinker {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: SessionIssuer,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            issuer,
            clock,
            events,
            verifiers: HashMap::new(),
        }
    }

    /// Register the verifier for its provider, replacing any earlier one.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn AssertionVerifier>) -> Self {
        self.verifiers.insert(verifier.provider(), verifier);
        self
    }

    #[must_use]
    pub fn supports(&self, provider: Provider) -> bool {
        self.verifiers.contains_key(&provider)
    }

    /// Verify `assertion`, find or create the linked user, and issue a session.
    ///
    /// # Errors
    /// - `ExternalVerificationFailed` when the assertion is rejected or the
    ///   provider is not configured.
    /// - `Conflict` when a concurrent login registered the same link first.
    /// - `Forbidden` when the linked user is deactivated.
    /// - `Internal` when seed data is missing or storage fails.
    pub async fn login_with_provider(
        &self,
        provider: Provider,
        assertion: &ExternalAssertion,
    ) -> Result<(IssuedSession, AuthenticatedIdentity), AuthError> {
        let identity = self.verify(provider, assertion).await?;

        let (user, created) = match self
            .store
            .find_user_by_link(provider, &identity.external_user_id)
            .await?
        {
            Some(user) => (user, false),
            None => (self.register(&identity).await?, true),
        };

        if !user.is_active {
            warn!(user_id = user.id, provider = %provider, "oauth login for inactive user");
            return Err(AuthError::Forbidden);
        }

        let session = self.issuer.issue(user.id).await?;
        info!(user_id = user.id, provider = %provider, created, "oauth login");
        self.events.publish(AuthEvent::AccountLinked {
            user_id: user.id,
            provider,
            created,
            at: self.clock.now(),
        });

        Ok((session, AuthenticatedIdentity::from(&user)))
    }

    async fn verify(
        &self,
        provider: Provider,
        assertion: &ExternalAssertion,
    ) -> Result<ExternalIdentity, AuthError> {
        let result = match self.verifiers.get(&provider) {
            Some(verifier) => verifier.verify(assertion).await,
            None => Err(VerificationError::NotConfigured(provider)),
        };
        result.map_err(|err| {
            warn!(provider = %provider, "OAuth2 assertion rejected: {err}");
            AuthError::ExternalVerificationFailed(err)
        })
    }

    async fn register(&self, identity: &ExternalIdentity) -> Result<UserRecord, AuthError> {
        let email = identity
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map_or_else(
                || placeholder_email(identity.provider, &identity.external_user_id),
                str::to_string,
            );
        let new_user = NewLinkedUser {
            provider: identity.provider,
            external_user_id: identity.external_user_id.clone(),
            email,
            name: identity.name.clone().unwrap_or_default(),
            email_verified: identity.email_verified,
            role: Role::User,
        };

        self.store
            .create_linked_user(&new_user, self.clock.now())
            .await
            .map_err(|err| {
                match &err {
                    StoreError::Conflict => {
                        warn!(provider = %identity.provider, "oauth link created concurrently");
                    }
                    StoreError::NotFound(what) => {
                        error!(provider = %identity.provider, "OAuth2 seed data missing: {what}");
                    }
                    StoreError::Backend(err) => {
                        error!(provider = %identity.provider, "Failed to register oauth user: {err}");
                    }
                }
                AuthError::from(err)
            })
    }
}

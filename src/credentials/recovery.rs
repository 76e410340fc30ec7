//! Forgot-password and email-verification flows built on [`OneShotTokens`].
//!
//! Requests for unknown, inactive or unverified accounts succeed silently so the
//! endpoints cannot be used to probe which emails are registered.

use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, error};

use super::error::AuthError;
use super::models::{AccountMutation, OneShotPurpose};
use super::notify::{EmailMessage, EmailSender};
use super::one_shot::OneShotTokens;
use super::password::Argon2Hasher;
use super::store::CredentialStore;

#[derive(Clone)]
pub struct AccountRecovery {
    store: Arc<dyn CredentialStore>,
    tokens: OneShotTokens,
    hasher: Argon2Hasher,
    mailer: Arc<dyn EmailSender>,
    frontend_base_url: String,
}

impl AccountRecovery {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: OneShotTokens,
        hasher: Argon2Hasher,
        mailer: Arc<dyn EmailSender>,
        frontend_base_url: String,
    ) -> Self {
        Self {
            store,
            tokens,
            hasher,
            mailer,
            frontend_base_url,
        }
    }

    #[must_use]
    pub const fn tokens(&self) -> &OneShotTokens {
        &self.tokens
    }

    /// Mail a reset link to an active, verified local account.
    ///
    /// # Errors
    /// `Internal` on storage failure only.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            debug!("password reset requested for unknown email");
            return Ok(());
        };
        if !user.is_active || !user.email_verified {
            debug!(user_id = user.id, "password reset skipped for inactive or unverified user");
            return Ok(());
        }

        let issued = self
            .tokens
            .issue(user.id, OneShotPurpose::PasswordReset)
            .await?;
        self.deliver(&user.email, OneShotPurpose::PasswordReset, issued.token.expose_secret())
            .await;
        Ok(())
    }

    /// # Errors
    /// `NotFound` when the reset token is unknown or expired.
    pub async fn check_reset_token(&self, token: &str) -> Result<i64, AuthError> {
        self.tokens
            .find_valid(OneShotPurpose::PasswordReset, token)
            .await
    }

    /// Hash `new_password` and swap it in while consuming the reset token.
    ///
    /// # Errors
    /// `NotFound` when the token is unknown, expired or already used; `Internal`
    /// when hashing or storage fails.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<i64, AuthError> {
        let hasher = self.hasher.clone();
        let password = new_password.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| AuthError::Internal(err.into()))?
            .map_err(AuthError::Internal)?;

        self.tokens
            .consume(
                OneShotPurpose::PasswordReset,
                token,
                AccountMutation::SetPasswordHash(hash),
            )
            .await
    }

    /// Mail a verification link unless the address is already verified.
    ///
    /// # Errors
    /// `NotFound` for an unknown user, `Internal` on storage failure.
    pub async fn request_email_verification(&self, user_id: i64) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user(user_id).await? else {
            return Err(AuthError::NotFound);
        };
        if user.email_verified {
            debug!(user_id, "email already verified");
            return Ok(());
        }

        let issued = self
            .tokens
            .issue(user.id, OneShotPurpose::EmailVerification)
            .await?;
        self.deliver(
            &user.email,
            OneShotPurpose::EmailVerification,
            issued.token.expose_secret(),
        )
        .await;
        Ok(())
    }

    /// # Errors
    /// `NotFound` when the token is unknown, expired or already used.
    pub async fn verify_email(&self, token: &str) -> Result<i64, AuthError> {
        self.tokens
            .consume(
                OneShotPurpose::EmailVerification,
                token,
                AccountMutation::MarkEmailVerified,
            )
            .await
    }

    // The token is already committed; a failed send only gets logged.
    async fn deliver(&self, to_email: &str, purpose: OneShotPurpose, token: &str) {
        let message = EmailMessage::one_shot_link(to_email, purpose, &self.frontend_base_url, token);
        if let Err(err) = self.mailer.send(&message).await {
            error!(purpose = purpose.as_str(), "Failed to hand off email: {err}");
        }
    }
}

//! Email and password login.
//!
//! Unknown email, a user without a local password and a wrong password all
//! fail with [`AuthError::InvalidCredentials`]. The deactivated check runs only
//! after the password matched.

use std::sync::Arc;
use tracing::{debug, error, info};

use super::error::AuthError;
use super::guard::require_active;
use super::issuer::{IssuedSession, SessionIssuer};
use super::models::AuthenticatedIdentity;
use super::password::Argon2Hasher;
use super::store::CredentialStore;

#[derive(Clone)]
pub struct PasswordLogin {
    store: Arc<dyn CredentialStore>,
    issuer: SessionIssuer,
    hasher: Argon2Hasher,
}

impl PasswordLogin {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, issuer: SessionIssuer, hasher: Argon2Hasher) -> Self {
        Self {
            store,
            issuer,
            hasher,
        }
    }

    /// Check `password` against the local account for `email` and issue a session.
    ///
    /// # Errors
    /// - `InvalidCredentials` when the email is unknown, the account has no
    ///   password or the password does not match.
    /// - `Forbidden` when the password matched but the user is deactivated.
    /// - `Internal` when the stored hash is malformed or storage fails.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(IssuedSession, AuthenticatedIdentity), AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            debug!("password login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        let Some(hash) = self.store.find_password_hash(user.id).await? else {
            debug!(user_id = user.id, "password login for user without password");
            return Err(AuthError::InvalidCredentials);
        };

        let matched = self
            .hasher
            .verify_blocking(password, &hash)
            .await
            .map_err(|err| {
                error!(user_id = user.id, "Failed to verify password: {err}");
                AuthError::Internal(err)
            })?;
        if !matched {
            debug!(user_id = user.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let identity = AuthenticatedIdentity::from(&user);
        require_active(&identity)?;

        let session = self.issuer.issue(user.id).await?;
        info!(user_id = user.id, "password login");
        Ok((session, identity))
    }
}

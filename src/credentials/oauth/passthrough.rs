//! Trust-on-delivery verifier for providers whose identity data was already
//! checked by a federated backend call (Facebook).

use async_trait::async_trait;

use super::{AssertionVerifier, ExternalAssertion, ExternalIdentity, VerificationError};
use crate::credentials::models::Provider;

#[derive(Debug, Clone, Copy)]
pub struct PassthroughVerifier {
    provider: Provider,
}

impl PassthroughVerifier {
    #[must_use]
    pub const fn new(provider: Provider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AssertionVerifier for PassthroughVerifier {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn verify(
        &self,
        assertion: &ExternalAssertion,
    ) -> Result<ExternalIdentity, VerificationError> {
        let ExternalAssertion::Verified {
            external_user_id,
            email,
            name,
        } = assertion
        else {
            return Err(VerificationError::AssertionMismatch(self.provider));
        };

        let external_user_id = external_user_id.trim();
        if external_user_id.is_empty() {
            return Err(VerificationError::MissingSubject);
        }

        // The provider shares an address but does not vouch for it here.
        Ok(ExternalIdentity {
            provider: self.provider,
            external_user_id: external_user_id.to_string(),
            email: email.clone().filter(|email| !email.trim().is_empty()),
            name: name.clone().filter(|name| !name.trim().is_empty()),
            email_verified: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_verified_identity() -> Result<(), VerificationError> {
        let verifier = PassthroughVerifier::new(Provider::Facebook);
        let identity = verifier
            .verify(&ExternalAssertion::Verified {
                external_user_id: " 1234 ".to_string(),
                email: Some(String::new()),
                name: Some("Jo".to_string()),
            })
            .await?;
        assert_eq!(identity.external_user_id, "1234");
        assert_eq!(identity.email, None);
        assert_eq!(identity.name.as_deref(), Some("Jo"));
        assert!(!identity.email_verified);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_id_tokens_and_blank_ids() {
        let verifier = PassthroughVerifier::new(Provider::Facebook);
        assert!(matches!(
            verifier
                .verify(&ExternalAssertion::IdToken("t".to_string()))
                .await,
            Err(VerificationError::AssertionMismatch(Provider::Facebook))
        ));
        assert!(matches!(
            verifier
                .verify(&ExternalAssertion::Verified {
                    external_user_id: "  ".to_string(),
                    email: None,
                    name: None,
                })
                .await,
            Err(VerificationError::MissingSubject)
        ));
    }
}

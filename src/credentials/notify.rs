//! Outbound mail seam for one-shot token links.
//!
//! Delivery is somebody else's job: the subsystem hands over a message after the
//! token is committed and a failed send never fails the request. Senders are
//! async so network delivery does not hold a runtime worker.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::models::OneShotPurpose;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

impl EmailMessage {
    /// Message carrying a one-shot link. The token lives in the URL fragment so
    /// it never reaches access logs of the frontend host.
    #[must_use]
    pub fn one_shot_link(
        to_email: &str,
        purpose: OneShotPurpose,
        frontend_base_url: &str,
        token: &str,
    ) -> Self {
        let base = frontend_base_url.trim_end_matches('/');
        let (template, path) = match purpose {
            OneShotPurpose::PasswordReset => ("reset_password", "reset-password"),
            OneShotPurpose::EmailVerification => ("verify_email", "verify-email"),
        };
        let link = format!("{base}/{path}#token={token}");
        Self {
            to_email: to_email.to_string(),
            template: template.to_string(),
            payload_json: json!({ "link": link }).to_string(),
        }
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error; errors are logged, never retried.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the recipient and template only.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            "email send stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_link_uses_fragment() -> Result<()> {
        let message = EmailMessage::one_shot_link(
            "a@example.com",
            OneShotPurpose::PasswordReset,
            "https://app.example.com/",
            "tok",
        );
        assert_eq!(message.template, "reset_password");
        let payload: serde_json::Value = serde_json::from_str(&message.payload_json)?;
        assert_eq!(
            payload["link"],
            "https://app.example.com/reset-password#token=tok"
        );
        Ok(())
    }

    #[test]
    fn verify_link_template() {
        let message = EmailMessage::one_shot_link(
            "a@example.com",
            OneShotPurpose::EmailVerification,
            "https://app.example.com",
            "tok",
        );
        assert_eq!(message.template, "verify_email");
        assert!(message.payload_json.contains("verify-email#token=tok"));
    }

    #[tokio::test]
    async fn log_sender_accepts_everything() {
        let message = EmailMessage::one_shot_link(
            "a@example.com",
            OneShotPurpose::EmailVerification,
            "https://app.example.com",
            "tok",
        );
        assert!(LogEmailSender.send(&message).await.is_ok());
    }
}

//! Request validation run by handlers before calling into the credential
//! services.

use regex::Regex;

use crate::credentials::{AuthError, OneShotPurpose, OneShotTokens};

const PASSWORD_MIN_CHARS: usize = 8;
const PASSWORD_MAX_CHARS: usize = 20;
const INVALID_ONE_SHOT_TOKEN: &str = "User not found, or token already expired";

pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email_normalized))
}

pub(super) fn require_email(email: &str) -> Result<String, AuthError> {
    let normalized = normalize_email(email);
    if valid_email(&normalized) {
        Ok(normalized)
    } else {
        Err(AuthError::BadRequest("Invalid email".to_string()))
    }
}

pub(super) fn require_field<'a>(value: &'a str, field: &str) -> Result<&'a str, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AuthError::BadRequest(format!("Missing {field}")))
    } else {
        Ok(trimmed)
    }
}

/// Length is counted in characters, not bytes.
pub(super) fn require_new_password(password: &str) -> Result<(), AuthError> {
    let chars = password.chars().count();
    if (PASSWORD_MIN_CHARS..=PASSWORD_MAX_CHARS).contains(&chars) {
        Ok(())
    } else {
        Err(AuthError::BadRequest(format!(
            "Password must be between {PASSWORD_MIN_CHARS} and {PASSWORD_MAX_CHARS} characters"
        )))
    }
}

/// The token must resolve to a live one-shot record for `purpose`.
pub(super) async fn require_live_token(
    tokens: &OneShotTokens,
    purpose: OneShotPurpose,
    token: &str,
) -> Result<i64, AuthError> {
    match tokens.find_valid(purpose, token).await {
        Err(AuthError::NotFound) => Err(AuthError::BadRequest(INVALID_ONE_SHOT_TOKEN.to_string())),
        other => other,
    }
}

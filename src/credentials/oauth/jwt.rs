//! RS256 ID-token verification.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::errors::Error as RsaError;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use super::jwks::Jwks;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("rsa error")]
    Rsa(#[from] RsaError),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdTokenHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Self::One(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Claims of an OpenID Connect ID token that account linking cares about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub iss: String,
    pub aud: Audience,
    #[serde(default)]
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, JwtError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| JwtError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Read the `kid` without verifying anything, to decide whether a key refresh
/// is worth attempting.
///
/// # Errors
/// Returns an error if the header segment is malformed.
pub fn peek_kid(token: &str) -> Result<String, JwtError> {
    let header_b64 = token.split('.').next().ok_or(JwtError::TokenFormat)?;
    let header: IdTokenHeader = b64d_json(header_b64)?;
    Ok(header.kid)
}

/// Verify an RS256 ID token and return its claims.
///
/// `exp` must be strictly after `now_unix_seconds`; `iss` must be one of
/// `accepted_issuers` and `aud` must contain `expected_audience`.
///
/// # Errors
/// Returns an error if the token is malformed, signed by an unknown key, carries
/// an invalid signature, or fails claim validation.
pub fn verify_rs256(
    token: &str,
    jwks: &Jwks,
    accepted_issuers: &[&str],
    expected_audience: &str,
    now_unix_seconds: i64,
) -> Result<IdTokenClaims, JwtError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(JwtError::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(JwtError::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(JwtError::TokenFormat)?;
    if parts.next().is_some() {
        return Err(JwtError::TokenFormat);
    }

    let header: IdTokenHeader = b64d_json(header_b64)?;
    if header.alg != "RS256" {
        return Err(JwtError::UnsupportedAlg(header.alg));
    }

    let jwk = jwks
        .find_by_kid(&header.kid)
        .ok_or_else(|| JwtError::UnknownKid(header.kid.clone()))?;

    let verifying_key = VerifyingKey::<Sha256>::new(jwk.to_rsa_public_key()?);
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| JwtError::Base64)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| JwtError::InvalidSignature)?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| JwtError::InvalidSignature)?;

    let claims: IdTokenClaims = b64d_json(claims_b64)?;
    if !accepted_issuers.contains(&claims.iss.as_str()) {
        return Err(JwtError::InvalidIssuer);
    }
    if !claims.aud.contains(expected_audience) {
        return Err(JwtError::InvalidAudience);
    }
    if claims.exp <= now_unix_seconds {
        return Err(JwtError::Expired);
    }

    Ok(claims)
}


#[cfg(test)]
mod tests {
    use super::fixtures::sign_rs256;
    use super::*;
    use crate::credentials::oauth::jwks::fixtures::jwks_for;

    const NOW: i64 = 1_700_000_000;
    const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

    fn claims() -> IdTokenClaims {
        IdTokenClaims {
            iss: "https://accounts.google.com".to_string(),
            aud: Audience::One("client-123.apps.googleusercontent.com".to_string()),
            sub: "10769150350006150715113082367".to_string(),
            exp: NOW + 3600,
            iat: Some(NOW),
            email: Some("jsmith@example.com".to_string()),
            email_verified: Some(true),
            name: Some("J Smith".to_string()),
        }
    }

    #[test]
    fn accepts_valid_token() -> anyhow::Result<()> {
        let token = sign_rs256("k1", &claims())?;
        let verified = verify_rs256(
            &token,
            &jwks_for("k1")?,
            &ISSUERS,
            "client-123.apps.googleusercontent.com",
            NOW,
        )?;
        assert_eq!(verified.sub, "10769150350006150715113082367");
        assert_eq!(peek_kid(&token)?, "k1");
        Ok(())
    }

    #[test]
    fn rejects_wrong_audience_issuer_and_expiry() -> anyhow::Result<()> {
        let jwks = jwks_for("k1")?;
        let token = sign_rs256("k1", &claims())?;
        let aud = "client-123.apps.googleusercontent.com";

        assert!(matches!(
            verify_rs256(&token, &jwks, &ISSUERS, "someone-else", NOW),
            Err(JwtError::InvalidAudience)
        ));
        assert!(matches!(
            verify_rs256(&token, &jwks, &["https://evil.example"], aud, NOW),
            Err(JwtError::InvalidIssuer)
        ));
        // exp == now is already expired.
        assert!(matches!(
            verify_rs256(&token, &jwks, &ISSUERS, aud, NOW + 3600),
            Err(JwtError::Expired)
        ));
        assert!(verify_rs256(&token, &jwks, &ISSUERS, aud, NOW + 3599).is_ok());
        Ok(())
    }

    #[test]
    fn rejects_unknown_kid_and_tampering() -> anyhow::Result<()> {
        let token = sign_rs256("k1", &claims())?;
        assert!(matches!(
            verify_rs256(&token, &jwks_for("k2")?, &ISSUERS, "x", NOW),
            Err(JwtError::UnknownKid(kid)) if kid == "k1"
        ));

        let mut forged = claims();
        forged.sub = "attacker".to_string();
        let forged_token = sign_rs256("k1", &forged)?;
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged_token.split('.').collect();
        parts[1] = forged_parts[1];
        let spliced = parts.join(".");
        assert!(matches!(
            verify_rs256(
                &spliced,
                &jwks_for("k1")?,
                &ISSUERS,
                "client-123.apps.googleusercontent.com",
                NOW
            ),
            Err(JwtError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn rejects_other_algorithms_and_shapes() -> anyhow::Result<()> {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"none","kid":"k1"}"#);
        let token = format!("{header}.e30.");
        assert!(matches!(
            verify_rs256(&token, &jwks_for("k1")?, &ISSUERS, "x", NOW),
            Err(JwtError::UnsupportedAlg(alg)) if alg == "none"
        ));
        assert!(matches!(
            verify_rs256("a.b", &jwks_for("k1")?, &ISSUERS, "x", NOW),
            Err(JwtError::TokenFormat)
        ));
        Ok(())
    }

    #[test]
    fn audience_may_be_a_list() -> anyhow::Result<()> {
        let aud: Audience = serde_json::from_str(r#"["a","b"]"#)?;
        assert!(aud.contains("b"));
        assert!(!aud.contains("c"));
        Ok(())
    }
}

//! JSON Web Key Sets as published by ID-token issuers.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

use super::jwt::JwtError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// # Errors
    /// Returns an error if `s` is not valid JSON or doesn't match the JWKS shape.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Only RSA signing keys are considered; other key types are skipped.
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|key| key.kid == kid && key.kty == "RSA" && key.is_signing_key())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    pub kid: String,
    #[serde(default)]
    pub n: String,
    #[serde(default)]
    pub e: String,
}

impl Jwk {
    fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().is_none_or(|key_use| key_use == "sig")
    }

    /// # Errors
    /// Returns an error if the modulus or exponent is not valid base64url or
    /// does not form a usable RSA key.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, JwtError> {
        let n = Base64UrlUnpadded::decode_vec(&self.n).map_err(|_| JwtError::Base64)?;
        let e = Base64UrlUnpadded::decode_vec(&self.e).map_err(|_| JwtError::Base64)?;
        RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
            .map_err(JwtError::Rsa)
    }
}

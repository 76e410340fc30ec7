//! Opaque token generation and at-rest hashing.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Random bytes behind every opaque token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Create a new opaque token.
///
/// The raw value is returned once to the caller; storage only ever sees [`hash_token`].
pub fn generate_opaque_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate opaque token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// SHA-256 hex digest used as the storage and lookup key for a token.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

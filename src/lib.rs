//! # Sesame (Session & Credential Lifecycle)
//!
//! `sesame` issues and validates opaque session credentials for a web API and
//! owns the lifecycle of every server-issued token:
//!
//! - **Session pairs:** access + refresh tokens, one live pair per user. Every
//!   login, OAuth2 login or refresh replaces the previous pair atomically.
//! - **One-shot tokens:** password-reset and email-verification tokens that are
//!   consumed in the same transaction that applies their side effect.
//! - **OAuth2 account linking:** external identities (Google ID tokens, Facebook
//!   pass-through) are bound to local users and then handed a session.
//!
//! Raw tokens only ever exist in responses and outbound mail; storage holds
//! SHA-256 digests.

pub mod api;
pub mod cli;
pub mod credentials;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}

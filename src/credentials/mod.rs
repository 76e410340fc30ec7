//! Session and credential lifecycle.
//!
//! Flow Overview:
//! - `issuer` creates, rotates and revokes the single access/refresh pair a user owns.
//! - `login` checks an email and password, then issues through `issuer`.
//! - `guard` turns a presented token into an [`AuthenticatedIdentity`] or a rejection.
//! - `one_shot` issues, checks and consumes password-reset and email-verification tokens.
//! - `recovery` drives the forgot-password and verify-email flows on top of `one_shot`.
//! - `oauth` verifies external assertions, finds or creates the linked user, then issues.
//!
//! Everything persistent goes through the [`CredentialStore`] trait so the same
//! logic runs against `PostgreSQL` in production and an in-memory store in tests.

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod issuer;
pub mod login;
pub mod models;
pub mod notify;
pub mod oauth;
pub mod one_shot;
pub mod password;
pub mod recovery;
pub mod store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::config::TokenConfig;
pub use self::error::{AuthError, RejectReason, StoreError};
pub use self::events::{AuthEvent, EventBus};
pub use self::guard::Guard;
pub use self::issuer::{IssuedSession, SessionIssuer};
pub use self::login::PasswordLogin;
pub use self::models::{
    AccountMutation, AuthenticatedIdentity, OneShotPurpose, Provider, Role, TokenKind, UserRecord,
};
pub use self::oauth::{AccountLinker, ExternalAssertion};
pub use self::one_shot::OneShotTokens;
pub use self::recovery::AccountRecovery;
pub use self::store::CredentialStore;

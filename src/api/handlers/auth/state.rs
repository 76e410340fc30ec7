//! Auth configuration and the shared state handed to every auth handler.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::credentials::clock::Clock;
use crate::credentials::events::EventBus;
use crate::credentials::guard::Guard;
use crate::credentials::issuer::SessionIssuer;
use crate::credentials::login::PasswordLogin;
use crate::credentials::notify::EmailSender;
use crate::credentials::oauth::{AccountLinker, AssertionVerifier, PassthroughVerifier};
use crate::credentials::one_shot::OneShotTokens;
use crate::credentials::password::Argon2Hasher;
use crate::credentials::recovery::AccountRecovery;
use crate::credentials::store::CredentialStore;
use crate::credentials::{Provider, TokenConfig};

const DEFAULT_COOKIE_MAX_AGE_SECONDS: i64 = 24 * 60 * 60;

/// Deployment environment; only `Prod` marks cookies `Secure`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    environment: Environment,
    cookie_domain: Option<String>,
    cookie_max_age_seconds: i64,
    tokens: TokenConfig,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            environment: Environment::Dev,
            cookie_domain: None,
            cookie_max_age_seconds: DEFAULT_COOKIE_MAX_AGE_SECONDS,
            tokens: TokenConfig::new(),
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain.filter(|domain| !domain.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_cookie_max_age_seconds(mut self, seconds: i64) -> Self {
        self.cookie_max_age_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: TokenConfig) -> Self {
        self.tokens = tokens;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub const fn tokens(&self) -> TokenConfig {
        self.tokens
    }

    pub(super) fn cookie_domain(&self) -> Option<&str> {
        self.cookie_domain.as_deref()
    }

    pub(super) const fn cookie_max_age_seconds(&self) -> i64 {
        self.cookie_max_age_seconds
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.environment == Environment::Prod
    }
}

/// Everything the auth handlers need, built once at start-up.
#[derive(Clone)]
pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn CredentialStore>,
    issuer: SessionIssuer,
    login: PasswordLogin,
    guard: Guard,
    recovery: AccountRecovery,
    linker: AccountLinker,
    events: EventBus,
}

impl AuthState {
    /// Wire the credential services over `store`. Facebook pass-through login is
    /// always available; add ID-token verifiers with [`AuthState::with_verifier`].
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        hasher: Argon2Hasher,
        mailer: Arc<dyn EmailSender>,
        events: EventBus,
    ) -> Self {
        let tokens = config.tokens();
        let issuer = SessionIssuer::new(store.clone(), clock.clone(), tokens, events.clone());
        let login = PasswordLogin::new(store.clone(), issuer.clone(), hasher.clone());
        let guard = Guard::new(store.clone(), clock.clone());
        let one_shot = OneShotTokens::new(store.clone(), clock.clone(), tokens, events.clone());
        let recovery = AccountRecovery::new(
            store.clone(),
            one_shot,
            hasher,
            mailer,
            config.frontend_base_url().to_string(),
        );
        let linker = AccountLinker::new(store.clone(), issuer.clone(), clock, events.clone())
            .with_verifier(Arc::new(PassthroughVerifier::new(Provider::Facebook)));

        Self {
            config,
            store,
            issuer,
            login,
            guard,
            recovery,
            linker,
            events,
        }
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn AssertionVerifier>) -> Self {
        self.linker = self.linker.with_verifier(verifier);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    #[must_use]
    pub const fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    #[must_use]
    pub const fn login(&self) -> &PasswordLogin {
        &self.login
    }

    #[must_use]
    pub const fn guard(&self) -> &Guard {
        &self.guard
    }

    #[must_use]
    pub const fn recovery(&self) -> &AccountRecovery {
        &self.recovery
    }

    #[must_use]
    pub const fn linker(&self) -> &AccountLinker {
        &self.linker
    }

    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }
}

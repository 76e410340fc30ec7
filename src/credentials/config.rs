use chrono::Duration;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 3600;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 86_400;
const DEFAULT_RESET_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_VERIFY_TOKEN_TTL_HOURS: i64 = 168;

/// Lifetimes of every token the subsystem issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenConfig {
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    reset_token_ttl: Duration,
    verify_token_ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_token_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECONDS),
            refresh_token_ttl: Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECONDS),
            reset_token_ttl: Duration::hours(DEFAULT_RESET_TOKEN_TTL_HOURS),
            verify_token_ttl: Duration::hours(DEFAULT_VERIFY_TOKEN_TTL_HOURS),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_hours(mut self, hours: i64) -> Self {
        self.reset_token_ttl = Duration::hours(hours);
        self
    }

    #[must_use]
    pub fn with_verify_token_ttl_hours(mut self, hours: i64) -> Self {
        self.verify_token_ttl = Duration::hours(hours);
        self
    }

    #[must_use]
    pub const fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    #[must_use]
    pub const fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }

    #[must_use]
    pub const fn one_shot_ttl(&self, purpose: super::OneShotPurpose) -> Duration {
        match purpose {
            super::OneShotPurpose::PasswordReset => self.reset_token_ttl,
            super::OneShotPurpose::EmailVerification => self.verify_token_ttl,
        }
    }
}

use crate::credentials::oauth::google::DEFAULT_GOOGLE_JWKS_URL;
use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_COOKIE_DOMAIN: &str = "cookie-domain";
pub const ARG_COOKIE_MAX_AGE_SECONDS: &str = "cookie-max-age-seconds";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";
pub const ARG_RESET_TOKEN_TTL_HOURS: &str = "reset-token-ttl-hours";
pub const ARG_VERIFY_TOKEN_TTL_HOURS: &str = "verify-token-ttl-hours";
pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_JWKS_URL: &str = "google-jwks-url";
pub const ARG_PASSWORD_MEMORY_KIB: &str = "password-memory-kib";
pub const ARG_PASSWORD_ITERATIONS: &str = "password-iterations";
pub const ARG_PASSWORD_PARALLELISM: &str = "password-parallelism";

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub environment: String,
    pub cookie_domain: Option<String>,
    pub cookie_max_age_seconds: i64,
    pub tokens: TokenTtls,
    pub google: Option<GoogleOptions>,
    pub password: PasswordCost,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub access_seconds: i64,
    pub refresh_seconds: i64,
    pub reset_hours: i64,
    pub verify_hours: i64,
}

#[derive(Debug, Clone)]
pub struct GoogleOptions {
    pub client_id: String,
    pub jwks_url: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a TTL is not positive or a required value is blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let positive = |id: &str| -> anyhow::Result<i64> {
            match matches.get_one::<i64>(id).copied() {
                Some(value) if value > 0 => Ok(value),
                Some(value) => anyhow::bail!("--{id} must be positive, got {value}"),
                None => anyhow::bail!("missing required argument: --{id}"),
            }
        };
        let cost = |id: &str| -> anyhow::Result<u32> {
            matches
                .get_one::<u32>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let Some(frontend_base_url) = get_non_empty(ARG_FRONTEND_BASE_URL) else {
            anyhow::bail!("missing required argument: --{ARG_FRONTEND_BASE_URL}");
        };

        // Google login is enabled by the client id alone; the JWKS URL has a default.
        let google = get_non_empty(ARG_GOOGLE_CLIENT_ID).map(|client_id| GoogleOptions {
            client_id,
            jwks_url: get_non_empty(ARG_GOOGLE_JWKS_URL)
                .unwrap_or_else(|| DEFAULT_GOOGLE_JWKS_URL.to_string()),
        });

        Ok(Self {
            frontend_base_url,
            environment: get_non_empty(ARG_ENVIRONMENT).unwrap_or_else(|| "dev".to_string()),
            cookie_domain: get_non_empty(ARG_COOKIE_DOMAIN),
            cookie_max_age_seconds: positive(ARG_COOKIE_MAX_AGE_SECONDS)?,
            tokens: TokenTtls {
                access_seconds: positive(ARG_ACCESS_TOKEN_TTL_SECONDS)?,
                refresh_seconds: positive(ARG_REFRESH_TOKEN_TTL_SECONDS)?,
                reset_hours: positive(ARG_RESET_TOKEN_TTL_HOURS)?,
                verify_hours: positive(ARG_VERIFY_TOKEN_TTL_HOURS)?,
            },
            google,
            password: PasswordCost {
                memory_kib: cost(ARG_PASSWORD_MEMORY_KIB)?,
                iterations: cost(ARG_PASSWORD_ITERATIONS)?,
                parallelism: cost(ARG_PASSWORD_PARALLELISM)?,
            },
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_token_args(command);
    let command = with_google_args(command);
    with_password_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for reset and verification links")
                .env("SESAME_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment: dev or prod (prod marks cookies Secure)")
                .env("SESAME_ENVIRONMENT")
                .default_value("dev")
                .value_parser(["dev", "development", "prod", "production"]),
        )
        .arg(
            Arg::new(ARG_COOKIE_DOMAIN)
                .long(ARG_COOKIE_DOMAIN)
                .help("Domain attribute for session cookies")
                .env("SESAME_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_COOKIE_MAX_AGE_SECONDS)
                .long(ARG_COOKIE_MAX_AGE_SECONDS)
                .help("Max-Age of session cookies in seconds")
                .env("SESAME_COOKIE_MAX_AGE_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("SESAME_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token TTL in seconds")
                .env("SESAME_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_HOURS)
                .long(ARG_RESET_TOKEN_TTL_HOURS)
                .help("Password reset token TTL in hours")
                .env("SESAME_RESET_TOKEN_TTL_HOURS")
                .default_value("24")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_VERIFY_TOKEN_TTL_HOURS)
                .long(ARG_VERIFY_TOKEN_TTL_HOURS)
                .help("Email verification token TTL in hours")
                .env("SESAME_VERIFY_TOKEN_TTL_HOURS")
                .default_value("168")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_google_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth2 client id; Google login is disabled when unset")
                .env("SESAME_GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_JWKS_URL)
                .long(ARG_GOOGLE_JWKS_URL)
                .help("JWKS endpoint used to verify Google ID tokens")
                .env("SESAME_GOOGLE_JWKS_URL"),
        )
}

fn with_password_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PASSWORD_MEMORY_KIB)
                .long(ARG_PASSWORD_MEMORY_KIB)
                .help("Argon2id memory cost in KiB")
                .env("SESAME_PASSWORD_MEMORY_KIB")
                .default_value("19456")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_ITERATIONS)
                .long(ARG_PASSWORD_ITERATIONS)
                .help("Argon2id iterations")
                .env("SESAME_PASSWORD_ITERATIONS")
                .default_value("2")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_PARALLELISM)
                .long(ARG_PASSWORD_PARALLELISM)
                .help("Argon2id lanes")
                .env("SESAME_PASSWORD_PARALLELISM")
                .default_value("1")
                .value_parser(clap::value_parser!(u32)),
        )
}

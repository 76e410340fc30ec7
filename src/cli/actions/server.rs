use crate::api::{self, AuthConfig, Environment, GoogleLogin};
use crate::credentials::TokenConfig;
use crate::credentials::password::Argon2Hasher;
use anyhow::{Result, anyhow};
use secrecy::SecretString;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub frontend_base_url: String,
    pub environment: String,
    pub cookie_domain: Option<String>,
    pub cookie_max_age_seconds: i64,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub reset_token_ttl_hours: i64,
    pub verify_token_ttl_hours: i64,
    pub google_client_id: Option<String>,
    pub google_jwks_url: Option<String>,
    pub password_memory_kib: u32,
    pub password_iterations: u32,
    pub password_parallelism: u32,
}

impl Args {
    fn token_config(&self) -> TokenConfig {
        TokenConfig::new()
            .with_access_token_ttl_seconds(self.access_token_ttl_seconds)
            .with_refresh_token_ttl_seconds(self.refresh_token_ttl_seconds)
            .with_reset_token_ttl_hours(self.reset_token_ttl_hours)
            .with_verify_token_ttl_hours(self.verify_token_ttl_hours)
    }

    fn auth_config(&self) -> Result<AuthConfig> {
        let environment: Environment = self.environment.parse().map_err(|err| anyhow!("{err}"))?;
        Ok(AuthConfig::new(self.frontend_base_url.clone())
            .with_environment(environment)
            .with_cookie_domain(self.cookie_domain.clone())
            .with_cookie_max_age_seconds(self.cookie_max_age_seconds)
            .with_tokens(self.token_config()))
    }

    fn google_login(&self) -> Option<GoogleLogin> {
        let client_id = self.google_client_id.clone()?;
        Some(GoogleLogin {
            client_id,
            jwks_url: self.google_jwks_url.clone()?,
        })
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = args.auth_config()?;
    let hasher = Argon2Hasher::with_cost(
        args.password_memory_kib,
        args.password_iterations,
        args.password_parallelism,
    )?;
    let google = args.google_login();

    info!(
        port = args.port,
        environment = %auth_config.environment(),
        frontend_base_url = auth_config.frontend_base_url(),
        google_login = google.is_some(),
        "Starting sesame"
    );

    api::new(args.port, args.dsn, auth_config, hasher, google).await
}

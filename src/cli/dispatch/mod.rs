//! Maps parsed command-line arguments onto the action the binary executes.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or out of range.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty())
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn: SecretString::from(dsn),
        frontend_base_url: auth_opts.frontend_base_url,
        environment: auth_opts.environment,
        cookie_domain: auth_opts.cookie_domain,
        cookie_max_age_seconds: auth_opts.cookie_max_age_seconds,
        access_token_ttl_seconds: auth_opts.tokens.access_seconds,
        refresh_token_ttl_seconds: auth_opts.tokens.refresh_seconds,
        reset_token_ttl_hours: auth_opts.tokens.reset_hours,
        verify_token_ttl_hours: auth_opts.tokens.verify_hours,
        google_client_id: auth_opts.google.as_ref().map(|g| g.client_id.clone()),
        google_jwks_url: auth_opts.google.map(|g| g.jwks_url),
        password_memory_kib: auth_opts.password.memory_kib,
        password_iterations: auth_opts.password.iterations,
        password_parallelism: auth_opts.password.parallelism,
    }))
}

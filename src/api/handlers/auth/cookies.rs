//! Session cookie contract: both tokens travel as `HttpOnly`, `SameSite=Lax`
//! cookies on `/` with a fixed max-age; `Secure` only in production.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{InvalidHeaderValue, SET_COOKIE},
};
use secrecy::ExposeSecret;
use tracing::error;

use super::state::AuthConfig;
use crate::credentials::guard::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::credentials::issuer::IssuedSession;

fn build_cookie(
    config: &AuthConfig,
    name: &str,
    value: &str,
    max_age_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}");
    if let Some(domain) = config.cookie_domain() {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn session_cookie(
    config: &AuthConfig,
    name: &str,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(config, name, token, config.cookie_max_age_seconds())
}

pub(super) fn clear_cookie(
    config: &AuthConfig,
    name: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(config, name, "", 0)
}

/// Two `Set-Cookie` headers carrying a freshly issued pair.
pub(super) fn session_cookies(config: &AuthConfig, session: &IssuedSession) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, token) in [
        (ACCESS_TOKEN_COOKIE, session.access_token.expose_secret()),
        (REFRESH_TOKEN_COOKIE, session.refresh_token.expose_secret()),
    ] {
        match session_cookie(config, name, token) {
            Ok(cookie) => {
                headers.append(SET_COOKIE, cookie);
            }
            Err(err) => error!(cookie = name, "Failed to build session cookie: {err}"),
        }
    }
    headers
}

/// Two `Set-Cookie` headers expiring both session cookies.
pub(super) fn clear_session_cookies(config: &AuthConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        match clear_cookie(config, name) {
            Ok(cookie) => {
                headers.append(SET_COOKIE, cookie);
            }
            Err(err) => error!(cookie = name, "Failed to build clearing cookie: {err}"),
        }
    }
    headers
}

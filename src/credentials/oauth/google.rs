//! Google ID-token verification against Google's published JWKS.
//!
//! Keys are cached in memory with a TTL; a stale cache or an unknown `kid`
//! triggers a refetch. If a refetch fails the last known keys stay in use.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{Instrument, info, info_span, warn};
use url::Url;

use super::jwks::Jwks;
use super::jwt::{JwtError, verify_rs256};
use super::{AssertionVerifier, ExternalAssertion, ExternalIdentity, VerificationError};
use crate::credentials::clock::Clock;
use crate::credentials::models::Provider;

pub const DEFAULT_GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

const KEYSET_CACHE_TTL_SECONDS: u64 = 300;
const KEYSET_REFRESH_COOLDOWN_SECONDS: u64 = 30;
const KEYSET_FETCH_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug)]
enum KeysetSource {
    /// Keys supplied up front and never refreshed.
    Static,
    Remote { url: String, client: Client },
}

#[derive(Debug, Clone)]
struct KeysetCache {
    jwks: Jwks,
    fetched_at: Instant,
}

impl KeysetCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(KEYSET_CACHE_TTL_SECONDS)
    }
}

#[derive(Debug)]
pub struct GoogleIdTokenVerifier {
    client_id: String,
    source: KeysetSource,
    cache: RwLock<KeysetCache>,
    clock: Arc<dyn Clock>,
    /// Unix seconds of the last refresh triggered by an unknown `kid`.
    last_refresh_unix: AtomicU64,
}

impl GoogleIdTokenVerifier {
    #[must_use]
    pub fn with_static_keys(client_id: String, jwks: Jwks, clock: Arc<dyn Clock>) -> Self {
        Self {
            client_id,
            source: KeysetSource::Static,
            cache: RwLock::new(KeysetCache {
                jwks,
                fetched_at: Instant::now(),
            }),
            clock,
            last_refresh_unix: AtomicU64::new(0),
        }
    }

    /// Build a verifier that fetches keys from `url` on first use.
    ///
    /// Only `https` is accepted, except for loopback hosts.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new_remote(client_id: String, url: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let parsed = Url::parse(url).context("Invalid Google JWKS URL")?;
        let loopback = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
        if parsed.scheme() != "https" && !loopback {
            return Err(anyhow!("Google JWKS URL must use https: {url}"));
        }

        let client = Client::builder()
            .use_rustls_tls()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(KEYSET_FETCH_TIMEOUT_SECONDS))
            .build()
            .context("Failed to build JWKS HTTP client")?;

        Ok(Self {
            client_id,
            source: KeysetSource::Remote {
                url: url.to_string(),
                client,
            },
            cache: RwLock::new(KeysetCache {
                jwks: Jwks::default(),
                fetched_at: stale_instant(),
            }),
            clock,
            last_refresh_unix: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current keys; refreshed first when stale.
    async fn keyset_snapshot(&self) -> Result<Jwks, VerificationError> {
        let (cached, fresh) = {
            let cache = self.cache.read().await;
            (cache.jwks.clone(), cache.is_fresh())
        };
        if fresh || matches!(self.source, KeysetSource::Static) {
            return Ok(cached);
        }

        match self.refresh_keyset().await {
            Ok(()) => Ok(self.cache.read().await.jwks.clone()),
            Err(err) if !cached.is_empty() => {
                warn!(error = %err, "failed to refresh google jwks cache");
                Ok(cached)
            }
            Err(err) => Err(VerificationError::KeySet(err)),
        }
    }

    async fn refresh_keyset(&self) -> Result<()> {
        let KeysetSource::Remote { url, client } = &self.source else {
            return Ok(());
        };
        let jwks = fetch_keyset(client, url).await?;
        let mut cache = self.cache.write().await;
        cache.jwks = jwks;
        cache.fetched_at = Instant::now();
        info!(keys = cache.jwks.keys.len(), "google jwks cache refreshed");
        Ok(())
    }

    /// Refetch on an unknown `kid`, at most once per cooldown window.
    async fn refresh_on_unknown_kid(&self) -> Result<bool> {
        if matches!(self.source, KeysetSource::Static) {
            return Ok(false);
        }
        let now = u64::try_from(self.clock.now().timestamp()).unwrap_or(0);
        let last = self.last_refresh_unix.load(Ordering::Relaxed);
        if now.saturating_sub(last) < KEYSET_REFRESH_COOLDOWN_SECONDS {
            return Ok(false);
        }
        self.last_refresh_unix.store(now, Ordering::Relaxed);
        self.refresh_keyset().await?;
        Ok(true)
    }
}

#[async_trait]
impl AssertionVerifier for GoogleIdTokenVerifier {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn verify(
        &self,
        assertion: &ExternalAssertion,
    ) -> Result<ExternalIdentity, VerificationError> {
        let ExternalAssertion::IdToken(token) = assertion else {
            return Err(VerificationError::AssertionMismatch(Provider::Google));
        };

        let jwks = self.keyset_snapshot().await?;
        let now = self.clock.now().timestamp();
        let claims = match verify_rs256(token, &jwks, &GOOGLE_ISSUERS, &self.client_id, now) {
            Ok(claims) => claims,
            Err(JwtError::UnknownKid(kid)) => {
                let refreshed = self
                    .refresh_on_unknown_kid()
                    .await
                    .map_err(VerificationError::KeySet)?;
                if !refreshed {
                    warn!(kid = %kid, "google id token kid not found and refresh suppressed");
                    return Err(JwtError::UnknownKid(kid).into());
                }
                let jwks = self.cache.read().await.jwks.clone();
                verify_rs256(token, &jwks, &GOOGLE_ISSUERS, &self.client_id, now)?
            }
            Err(err) => return Err(err.into()),
        };

        if claims.sub.is_empty() {
            return Err(VerificationError::MissingSubject);
        }

        Ok(ExternalIdentity {
            provider: Provider::Google,
            external_user_id: claims.sub,
            email: claims.email.filter(|email| !email.is_empty()),
            name: claims.name.filter(|name| !name.is_empty()),
            email_verified: claims.email_verified.unwrap_or(false),
        })
    }
}

fn stale_instant() -> Instant {
    Instant::now()
        .checked_sub(Duration::from_secs(KEYSET_CACHE_TTL_SECONDS + 1))
        .unwrap_or_else(Instant::now)
}

async fn fetch_keyset(client: &Client, url: &str) -> Result<Jwks> {
    let span = info_span!("oauth.jwks.fetch", http.method = "GET", url = %url);
    async {
        let response = client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("jwks fetch failed: {status}"));
        }
        Jwks::from_json(&body).context("Invalid JWKS JSON")
    }
    .instrument(span)
    .await
}

//! Credentials for the remote index service.
//!
//! Tokens are minted elsewhere; this module only models what the indexer needs
//! from them (the bearer value, the API the token is scoped to, and when it
//! expires) and caches them behind the `TokenProvider` seam.

use crate::error::{ApiError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

/// Tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECS: i64 = 30;

/// A bearer token plus the service it is valid for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub token: String,
    /// Base URL of the index service this token was issued for
    pub api_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: None,
            expires_at: None,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Expired, or close enough that a request might outlive it
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expires_at,
            None => false,
        }
    }

    /// Base URL for requests: the token's own, else `fallback`.
    /// Trailing slashes are removed so endpoint paths can be appended.
    pub fn base_url<'a>(
        &'a self,
        fallback: Option<&'a str>,
    ) -> std::result::Result<&'a str, ApiError> {
        self.api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .or(fallback)
            .map(|url| url.trim_end_matches('/'))
            .ok_or(ApiError::MissingBaseUrl)
    }
}

/// Last token handed out, with its expiry
#[derive(Debug, Default)]
pub struct TokenCache {
    token: Option<AuthToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token if it is still usable at `now`
    pub fn get(&self, now: DateTime<Utc>) -> Option<&AuthToken> {
        self.token.as_ref().filter(|t| !t.is_expired_at(now))
    }

    pub fn store(&mut self, token: AuthToken) {
        self.token = Some(token);
    }

    pub fn clear(&mut self) {
        self.token = None;
    }
}

/// Source of credentials for API calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<AuthToken>;
}

/// Hands out one fixed token, e.g. from `--token` on the command line
pub struct StaticTokenProvider {
    token: AuthToken,
}

impl StaticTokenProvider {
    pub fn new(token: AuthToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<AuthToken> {
        if self.token.is_expired_at(Utc::now()) {
            return Err(ApiError::Auth("token has expired".to_string()).into());
        }
        Ok(self.token.clone())
    }
}

/// Wraps another provider and only calls it when the cached token is stale
pub struct CachedTokenProvider<P: TokenProvider> {
    inner: P,
    cache: Mutex<TokenCache>,
}

impl<P: TokenProvider> CachedTokenProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: Mutex::new(TokenCache::new()),
        }
    }

    /// Forget the cached token, e.g. after the server rejected it
    pub async fn invalidate(&self) {
        self.cache.lock().await.clear();
    }
}

#[async_trait]
impl<P: TokenProvider> TokenProvider for CachedTokenProvider<P> {
    async fn token(&self) -> Result<AuthToken> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(Utc::now()) {
            return Ok(token.clone());
        }

        tracing::debug!("Token cache miss, fetching a fresh token");
        let token = self.inner.token().await?;
        cache.store(token.clone());
        Ok(token)
    }
}

//! GCP Authentication
//!
//! Access tokens come from Application Default Credentials (service account
//! key, gcloud user credentials or the metadata server). The provider is
//! initialised on first use so commands that never call an API do not need
//! credentials at all.

use anyhow::{Context, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Token TTL assumed when the provider does not report one
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Supplies bearer tokens to the transport
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// ADC-backed credentials with token caching
#[derive(Clone, Default)]
pub struct GcpCredentials {
    provider: Arc<OnceCell<Arc<dyn TokenProvider>>>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// Expiry with the buffer already applied
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    async fn provider(&self) -> Result<&Arc<dyn TokenProvider>> {
        self.provider
            .get_or_try_init(|| async {
                gcp_auth::provider().await.context(
                    "Failed to initialize GCP authentication. Run 'gcloud auth application-default login'",
                )
            })
            .await
    }

    /// Get an access token, reusing the cached one while it is valid
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider()
            .await?
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;
        let token_str = token.as_str().to_string();
        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );
        Ok(token_str)
    }
}

#[async_trait]
impl TokenSource for GcpCredentials {
    async fn token(&self) -> Result<String> {
        self.get_token().await
    }
}

/// A fixed token, for emulators and tests
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

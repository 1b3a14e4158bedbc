//! GCP Authentication
//!
//! Access tokens come from Application Default Credentials through
//! `gcp_auth`, from a service account key, or from a gcloud user account.
//! Everything that needs a token goes through [`TokenSource`], so
//! tests and alternative credential loaders can stand in for ADC.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Something that hands out bearer tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Create new GCP credentials using Application Default Credentials
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.context(
            "Failed to initialize GCP authentication. Run 'gcloud auth application-default login'",
        )?;

        Ok(Self::from_provider(provider))
    }

    /// Wrap an already loaded `gcp_auth` provider (service account key, metadata server)
    pub fn from_provider(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
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
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;

        let token_str = token.as_str().to_string();

        // gcp_auth reports expiry as an optional timestamp; a conservative
        // fixed TTL keeps the cache independent of clock skew
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

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }
}

#[async_trait]
impl TokenSource for GcpCredentials {
    async fn token(&self) -> Result<String> {
        self.get_token().await
    }
}

#[cfg(target_family = "unix")]
const GCLOUD_CMD: &str = "gcloud";

#[cfg(target_family = "windows")]
const GCLOUD_CMD: &str = "gcloud.cmd";

/// Tokens for one gcloud user account, via `gcloud auth print-access-token`
pub struct GcloudAccountToken {
    account: String,
    config_dir: Option<PathBuf>,
}

impl GcloudAccountToken {
    /// `config_dir` points gcloud at the configuration directory the
    /// account was read from
    pub fn new(account: impl Into<String>, config_dir: Option<PathBuf>) -> Self {
        Self {
            account: account.into(),
            config_dir,
        }
    }
}

#[async_trait]
impl TokenSource for GcloudAccountToken {
    async fn token(&self) -> Result<String> {
        let mut command = Command::new(GCLOUD_CMD);
        command
            .args(["auth", "print-access-token", "--quiet"])
            .arg(format!("--account={}", self.account));
        if let Some(dir) = &self.config_dir {
            command.env("CLOUDSDK_CONFIG", dir);
        }

        let output = command
            .output()
            .await
            .context("Failed to run gcloud")?;
        if !output.status.success() {
            bail!("gcloud has no valid credentials for account {}", self.account);
        }

        let token = String::from_utf8(output.stdout)
            .context("Output from gcloud is not UTF-8")?
            .trim()
            .to_string();
        if token.is_empty() {
            bail!("gcloud returned an empty token for account {}", self.account);
        }
        Ok(token)
    }
}

/// A fixed token, for tests and pre-issued credentials
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

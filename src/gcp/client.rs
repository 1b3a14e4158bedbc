//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining a token source
//! and HTTP functionality.

use super::auth::{GcpCredentials, TokenSource};
use super::http::GcpHttpClient;
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

pub use super::http::format_gcp_error;

/// Base URLs for the APIs tcloud talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub compute: String,
    pub resource_manager: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            compute: "https://compute.googleapis.com/compute/v1".to_string(),
            resource_manager: "https://cloudresourcemanager.googleapis.com/v1".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every API at one host, keeping the production path layout
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            compute: format!("{}/compute/v1", base),
            resource_manager: format!("{}/v1", base),
        }
    }
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    tokens: Arc<dyn TokenSource>,
    pub http: GcpHttpClient,
    pub endpoints: Endpoints,
}

impl GcpClient {
    /// Create a client backed by Application Default Credentials
    pub async fn new() -> Result<Self> {
        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;

        Self::with_token_source(Arc::new(credentials), Endpoints::default())
    }

    pub fn with_token_source(tokens: Arc<dyn TokenSource>, endpoints: Endpoints) -> Result<Self> {
        Ok(Self::from_parts(tokens, GcpHttpClient::new()?, endpoints))
    }

    /// Reuse an existing HTTP client (and its connection pool)
    pub fn from_parts(
        tokens: Arc<dyn TokenSource>,
        http: GcpHttpClient,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            tokens,
            http,
            endpoints,
        }
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.tokens.token().await
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.get(url, &token).await
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    /// Build Compute Engine API URL
    pub fn compute_url(&self, project: &str, path: &str) -> String {
        format!(
            "{}/projects/{}/{}",
            self.endpoints.compute,
            urlencoding::encode(project),
            path
        )
    }

    // =========================================================================
    // Resource Manager API helpers
    // =========================================================================

    /// Build Resource Manager API URL
    pub fn resourcemanager_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.resource_manager, path)
    }

    /// Build the URL of a single project
    pub fn project_url(&self, project: &str) -> String {
        self.resourcemanager_url(&format!("projects/{}", urlencoding::encode(project)))
    }
}

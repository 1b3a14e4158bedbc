//! HTTP utilities for GCP REST API calls

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate long responses and drop control characters before logging
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tcloud/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        serde_json::from_str(&body).context("Failed to parse response JSON")
    }
}

/// Format a GCP API error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_gcp_error(error: &(dyn std::error::Error + 'static)) -> String {
    let error_str = error.to_string();

    if error_str.contains("403") {
        return "Permission denied. Check your GCP IAM permissions.".to_string();
    }
    if error_str.contains("401") {
        return "Authentication failed. Run 'gcloud auth application-default login'.".to_string();
    }
    if error_str.contains("404") {
        return "Resource not found.".to_string();
    }
    if error_str.contains("429") {
        return "Rate limit exceeded. Please try again later.".to_string();
    }
    if error_str.contains("400") {
        return "Invalid request. Check your parameters.".to_string();
    }
    if error_str.contains("500") || error_str.contains("503") {
        return "GCP service temporarily unavailable. Please try again.".to_string();
    }

    // Security: Don't expose raw API error messages to users
    if error_str.contains("API request failed") {
        return "Request failed. Check your network connection and try again.".to_string();
    }

    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(80)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

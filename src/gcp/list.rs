//! Paged REST list calls
//!
//! [`RestPageFetcher`] turns one GCP list endpoint into a [`PageFetcher`],
//! so the generic paginators and [`PageIter`](crate::fetch::PageIter) can
//! walk it.

use super::client::GcpClient;
use crate::fetch::{Page, PageFetcher};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// How a list endpoint names its continuation cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    /// `pageToken` request parameter, `nextPageToken` in the response
    PageToken,
    /// `marker` request parameter, `nextMarker` in the response
    Marker,
}

impl CursorStyle {
    fn request_param(self) -> &'static str {
        match self {
            CursorStyle::PageToken => "pageToken",
            CursorStyle::Marker => "marker",
        }
    }

    fn response_field(self) -> &'static str {
        match self {
            CursorStyle::PageToken => "nextPageToken",
            CursorStyle::Marker => "nextMarker",
        }
    }
}

/// Fetches pages of a single list endpoint
#[derive(Clone)]
pub struct RestPageFetcher {
    client: GcpClient,
    url: String,
    items_path: String,
    style: CursorStyle,
    page_size: Option<(&'static str, u32)>,
}

impl RestPageFetcher {
    /// `items_path` is a dot path to the item array in each response
    pub fn new(client: GcpClient, url: impl Into<String>, items_path: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            items_path: items_path.into(),
            style: CursorStyle::PageToken,
            page_size: None,
        }
    }

    pub fn with_cursor_style(mut self, style: CursorStyle) -> Self {
        self.style = style;
        self
    }

    /// Ask the server for at most `size` items per page via `param`
    /// (`pageSize` for Resource Manager, `maxResults` for Compute)
    pub fn with_page_size(mut self, param: &'static str, size: u32) -> Self {
        self.page_size = Some((param, size));
        self
    }

    fn page_url(&self, cursor: Option<&str>) -> Result<String> {
        let mut url = Url::parse(&self.url).with_context(|| format!("Invalid URL: {}", self.url))?;

        // query_pairs_mut leaves a bare `?` behind when nothing is appended
        if self.page_size.is_some() || cursor.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some((param, size)) = self.page_size {
                query.append_pair(param, &size.to_string());
            }
            if let Some(cursor) = cursor {
                query.append_pair(self.style.request_param(), cursor);
            }
        }
        Ok(url.into())
    }
}

#[async_trait]
impl PageFetcher<Value> for RestPageFetcher {
    async fn fetch(&mut self, cursor: Option<String>) -> Result<Page<Value>> {
        let url = self.page_url(cursor.as_deref())?;
        let response = self.client.get(&url).await?;

        let items = extract_items(&response, &self.items_path);
        let next = response
            .get(self.style.response_field())
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        tracing::debug!("Fetched {} items from {}", items.len(), self.url);
        Ok(match self.style {
            CursorStyle::PageToken => Page::new(items, next),
            CursorStyle::Marker => Page::with_marker(items, next),
        })
    }
}

/// Extract items from a response using a dot path
///
/// A missing path is an empty page, not an error: GCP omits the array
/// entirely when a list is empty.
pub fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    if path.is_empty() {
        return response.as_array().cloned().unwrap_or_default();
    }

    let mut current = response;
    for part in path.split('.') {
        current = match current.get(part) {
            Some(v) => v,
            None => return vec![],
        };
    }

    current.as_array().cloned().unwrap_or_default()
}

/// Extract short name from a full resource URL
pub fn extract_short_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

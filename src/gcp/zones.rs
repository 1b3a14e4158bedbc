//! Compute Engine zones

use super::client::GcpClient;
use super::list::{extract_short_name, RestPageFetcher};
use crate::fetch::{paginate, FetchError, Page, PageFetcher, PageIter};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Zone information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub name: String,
    /// Short region name, e.g. `us-central1`
    pub region: String,
    pub status: String,
}

impl From<&Value> for Zone {
    fn from(value: &Value) -> Self {
        Self {
            name: value
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            region: value
                .get("region")
                .and_then(|v| v.as_str())
                .map(extract_short_name)
                .unwrap_or_else(|| "-".to_string()),
            status: value
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN")
                .to_string(),
        }
    }
}

/// Pages of zones for one project, optionally restricted to one region
pub struct ZoneFetcher {
    inner: RestPageFetcher,
    region: Option<String>,
}

impl ZoneFetcher {
    pub fn new(client: &GcpClient, project: &str, region: Option<&str>) -> Self {
        let url = client.compute_url(project, "zones");
        Self {
            inner: RestPageFetcher::new(client.clone(), url, "items"),
            region: region.map(str::to_string),
        }
    }
}

#[async_trait]
impl PageFetcher<Zone> for ZoneFetcher {
    async fn fetch(&mut self, cursor: Option<String>) -> Result<Page<Zone>> {
        let page = self.inner.fetch(cursor).await?;
        let next = page.next_cursor().map(str::to_string);

        let zones = page
            .items
            .iter()
            .map(Zone::from)
            .filter(|z| self.region.as_deref().map_or(true, |r| z.region == r))
            .collect();

        Ok(Page::new(zones, next))
    }
}

/// List every zone of `project`
pub async fn list_zones(
    client: &GcpClient,
    project: &str,
    region: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Vec<Zone>, FetchError> {
    paginate(cancel, ZoneFetcher::new(client, project, region)).await
}

/// Lazily iterate the zones of `project`
pub fn zone_pages(
    client: &GcpClient,
    project: &str,
    region: Option<&str>,
    cancel: CancellationToken,
) -> PageIter<Zone, ZoneFetcher> {
    PageIter::new(cancel, ZoneFetcher::new(client, project, region))
}

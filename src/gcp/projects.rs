//! GCP Projects
//!
//! Functions for listing projects and looking up project numbers.

use super::client::GcpClient;
use super::list::RestPageFetcher;
use crate::fetch::{paginate, FetchError, Page, PageFetcher, PageIter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Project information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub project_number: String,
    pub lifecycle_state: String,
}

impl Project {
    pub fn is_active(&self) -> bool {
        self.lifecycle_state == "ACTIVE"
    }
}

impl From<&Value> for Project {
    fn from(value: &Value) -> Self {
        Self {
            project_id: value
                .get("projectId")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            name: value
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            project_number: value
                .get("projectNumber")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string(),
            lifecycle_state: value
                .get("lifecycleState")
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN")
                .to_string(),
        }
    }
}

/// Pages of active projects
pub struct ProjectFetcher {
    inner: RestPageFetcher,
}

impl ProjectFetcher {
    pub fn new(client: &GcpClient) -> Self {
        let url = client.resourcemanager_url("projects");
        Self {
            inner: RestPageFetcher::new(client.clone(), url, "projects"),
        }
    }
}

#[async_trait]
impl PageFetcher<Project> for ProjectFetcher {
    async fn fetch(&mut self, cursor: Option<String>) -> Result<Page<Project>> {
        let page = self.inner.fetch(cursor).await?;
        let next = page.next_cursor().map(str::to_string);

        // Only include active projects
        let projects = page
            .items
            .iter()
            .map(Project::from)
            .filter(Project::is_active)
            .collect();

        Ok(Page::new(projects, next))
    }
}

/// List all accessible, active GCP projects
pub async fn list_projects(
    client: &GcpClient,
    cancel: &CancellationToken,
) -> Result<Vec<Project>, FetchError> {
    paginate(cancel, ProjectFetcher::new(client)).await
}

/// Lazily iterate active projects, one page at a time
pub fn project_pages(
    client: &GcpClient,
    cancel: CancellationToken,
) -> PageIter<Project, ProjectFetcher> {
    PageIter::new(cancel, ProjectFetcher::new(client))
}

/// Look up the numeric identifier of a project
pub async fn project_number(client: &GcpClient, project_id: &str) -> Result<String> {
    let response = client
        .get(&client.project_url(project_id))
        .await
        .with_context(|| format!("Failed to describe project {}", project_id))?;

    // v1 returns the number as a string; accept a bare number too
    match response.get("projectNumber") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(anyhow::anyhow!(
            "Project {} response has no projectNumber",
            project_id
        )),
    }
}

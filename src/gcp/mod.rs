//! GCP API interaction module
//!
//! Binds the generic fetch and identity machinery to Google Cloud REST APIs.
//!
//! # Module Structure
//!
//! - [`auth`] - Bearer tokens from Application Default Credentials
//! - [`client`] - Main GCP client for making API requests
//! - [`gcloud`] - gcloud configuration and environment lookup per profile
//! - [`http`] - HTTP utilities for REST API calls
//! - [`identity`] - [`IdentitySource`](crate::identity::IdentitySource) over gcloud profiles
//! - [`list`] - Paged list endpoints as [`PageFetcher`](crate::fetch::PageFetcher)s
//! - [`projects`] - Project listing and project numbers
//! - [`zones`] - Compute Engine zone listing
//!
//! # Example
//!
//! ```ignore
//! use tcloud::gcp::{client::GcpClient, projects};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::new().await?;
//!     let projects = projects::list_projects(&client, &CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod gcloud;
pub mod http;
pub mod identity;
pub mod list;
pub mod projects;
pub mod zones;

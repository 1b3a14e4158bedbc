//! gcloud-backed identity source
//!
//! Region comes from the profile's gcloud settings. The account identity of
//! a profile is the project number of the project it points at, looked up
//! with that profile's own credentials:
//!
//! | Profile | Credentials |
//! |---|---|
//! | default chain | Application Default Credentials |
//! | environment only | `GOOGLE_APPLICATION_CREDENTIALS` key, else the metadata server |
//! | named | `auth/credential_file_override` key, else `core/account` via gcloud |

use super::auth::{GcloudAccountToken, GcpCredentials, TokenSource};
use super::client::{Endpoints, GcpClient};
use super::gcloud::{GcloudProfiles, GcloudSettings};
use super::http::GcpHttpClient;
use super::projects::project_number;
use crate::identity::{IdentitySource, ProfileSelection};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, MetadataServiceAccount};
use std::path::PathBuf;
use std::sync::Arc;

/// Where one profile's credentials come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPlan {
    ApplicationDefault,
    ServiceAccountFile(PathBuf),
    InstanceMetadata,
    GcloudAccount(String),
}

/// Decide how `selection` authenticates, without touching the network
pub fn credential_plan(
    profiles: &GcloudProfiles,
    selection: &ProfileSelection,
    settings: &GcloudSettings,
) -> Result<CredentialPlan> {
    match selection {
        ProfileSelection::DefaultChain => Ok(CredentialPlan::ApplicationDefault),
        ProfileSelection::EnvironmentOnly => Ok(match profiles.application_credentials() {
            Some(path) => CredentialPlan::ServiceAccountFile(path),
            None => CredentialPlan::InstanceMetadata,
        }),
        ProfileSelection::Named(name) => {
            if let Some(path) = &settings.credential_file {
                return Ok(CredentialPlan::ServiceAccountFile(path.clone()));
            }
            match &settings.account {
                Some(account) => Ok(CredentialPlan::GcloudAccount(account.clone())),
                None => bail!(
                    "profile {} has neither core/account nor auth/credential_file_override",
                    name
                ),
            }
        }
    }
}

/// Turns a [`CredentialPlan`] into a token source
#[async_trait]
pub trait CredentialLoader: Send + Sync {
    async fn load(&self, plan: &CredentialPlan) -> Result<Arc<dyn TokenSource>>;
}

/// Loads credentials with `gcp_auth` and the gcloud CLI
#[derive(Debug, Clone, Default)]
pub struct GcloudCredentialLoader {
    config_dir: Option<PathBuf>,
}

impl GcloudCredentialLoader {
    pub fn new(config_dir: Option<PathBuf>) -> Self {
        Self { config_dir }
    }
}

#[async_trait]
impl CredentialLoader for GcloudCredentialLoader {
    async fn load(&self, plan: &CredentialPlan) -> Result<Arc<dyn TokenSource>> {
        let tokens: Arc<dyn TokenSource> = match plan {
            CredentialPlan::ApplicationDefault => Arc::new(GcpCredentials::new().await?),
            CredentialPlan::ServiceAccountFile(path) => {
                let account = CustomServiceAccount::from_file(path)
                    .with_context(|| format!("Failed to load service account key {:?}", path))?;
                Arc::new(GcpCredentials::from_provider(Arc::new(account)))
            }
            CredentialPlan::InstanceMetadata => {
                let account = MetadataServiceAccount::new()
                    .await
                    .context("No credentials in the environment or instance metadata")?;
                Arc::new(GcpCredentials::from_provider(Arc::new(account)))
            }
            CredentialPlan::GcloudAccount(account) => Arc::new(GcloudAccountToken::new(
                account.clone(),
                self.config_dir.clone(),
            )),
        };
        Ok(tokens)
    }
}

pub struct GcloudIdentitySource {
    profiles: GcloudProfiles,
    http: GcpHttpClient,
    endpoints: Endpoints,
    loader: Arc<dyn CredentialLoader>,
}

impl GcloudIdentitySource {
    pub fn new(profiles: GcloudProfiles, http: GcpHttpClient, endpoints: Endpoints) -> Self {
        let loader = Arc::new(GcloudCredentialLoader::new(
            profiles.config_dir().map(|d| d.to_path_buf()),
        ));
        Self {
            profiles,
            http,
            endpoints,
            loader,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn CredentialLoader>) -> Self {
        self.loader = loader;
        self
    }
}

#[async_trait]
impl IdentitySource for GcloudIdentitySource {
    async fn region(&self, selection: &ProfileSelection) -> Result<String> {
        let settings = self.profiles.settings(selection)?;
        match settings.effective_region() {
            Some(region) => Ok(region),
            None => bail!("no compute/region or compute/zone configured"),
        }
    }

    async fn account_id(&self, selection: &ProfileSelection) -> Result<String> {
        let settings = self.profiles.settings(selection)?;
        let Some(project) = settings.project.clone() else {
            bail!("no core/project configured");
        };

        let plan = credential_plan(&self.profiles, selection, &settings)?;
        tracing::debug!("Profile {} authenticates via {:?}", selection, plan);
        let tokens = self
            .loader
            .load(&plan)
            .await
            .with_context(|| format!("Failed to load credentials for profile {}", selection))?;

        let client = GcpClient::from_parts(tokens, self.http.clone(), self.endpoints.clone());
        project_number(&client, &project)
            .await
            .with_context(|| format!("Failed to get account for project {}", project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn profiles(env: &[(&str, &str)]) -> GcloudProfiles {
        GcloudProfiles::new(
            None,
            env.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn settings(account: Option<&str>, credential_file: Option<&str>) -> GcloudSettings {
        GcloudSettings {
            account: account.map(str::to_string),
            credential_file: credential_file.map(PathBuf::from),
            ..GcloudSettings::default()
        }
    }

    #[test]
    fn test_default_chain_uses_adc() {
        let plan = credential_plan(
            &profiles(&[]),
            &ProfileSelection::DefaultChain,
            &settings(Some("me@example.com"), None),
        )
        .unwrap();
        assert_eq!(plan, CredentialPlan::ApplicationDefault);
    }

    #[test]
    fn test_environment_only_prefers_key_file() {
        let with_key = profiles(&[("GOOGLE_APPLICATION_CREDENTIALS", "/keys/sa.json")]);
        assert_eq!(
            credential_plan(&with_key, &ProfileSelection::EnvironmentOnly, &settings(None, None))
                .unwrap(),
            CredentialPlan::ServiceAccountFile(PathBuf::from("/keys/sa.json"))
        );
        assert_eq!(
            credential_plan(
                &profiles(&[]),
                &ProfileSelection::EnvironmentOnly,
                &settings(None, None)
            )
            .unwrap(),
            CredentialPlan::InstanceMetadata
        );
    }

    #[test]
    fn test_named_override_beats_account() {
        let named = ProfileSelection::Named("ci".into());
        assert_eq!(
            credential_plan(
                &profiles(&[]),
                &named,
                &settings(Some("ci@example.com"), Some("/keys/ci.json"))
            )
            .unwrap(),
            CredentialPlan::ServiceAccountFile(PathBuf::from("/keys/ci.json"))
        );
        assert_eq!(
            credential_plan(&profiles(&[]), &named, &settings(Some("ci@example.com"), None))
                .unwrap(),
            CredentialPlan::GcloudAccount("ci@example.com".into())
        );
    }

    #[test]
    fn test_named_without_credentials_is_an_error() {
        let err = credential_plan(
            &profiles(&[]),
            &ProfileSelection::Named("bare".into()),
            &settings(None, None),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bare"));
    }

    #[tokio::test]
    async fn test_missing_key_file_fails_to_load() {
        let loader = GcloudCredentialLoader::default();
        let plan = CredentialPlan::ServiceAccountFile(PathBuf::from("/nonexistent/key.json"));
        assert!(loader.load(&plan).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_key_file_fails_to_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, "{\"type\": \"service_account\"}").unwrap();

        let loader = GcloudCredentialLoader::default();
        assert!(loader
            .load(&CredentialPlan::ServiceAccountFile(path))
            .await
            .is_err());
    }
}

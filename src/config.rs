//! Configuration Management
//!
//! Handles persistent configuration storage for tcloud. A [`Config`] is
//! loaded once at startup and passed by reference to whatever needs it.

use crate::gcp::gcloud::GcloudProfiles;
use crate::identity::{ProfileSelection, DEFAULT_MAX_CONCURRENT_FETCHES};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Region used when neither the config nor gcloud names one
pub const FALLBACK_REGION: &str = "us-central1";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Last used project ID
    #[serde(default)]
    pub project_id: Option<String>,
    /// Default region
    #[serde(default)]
    pub region: Option<String>,
    /// Profiles to resolve (`@default`, `@env` or gcloud configuration names)
    #[serde(default)]
    pub profiles: Vec<String>,
    /// Regions to browse; more than one enables multi-region mode
    #[serde(default)]
    pub regions: Vec<String>,
    /// Cap on concurrent identity lookups
    #[serde(default)]
    pub max_concurrent_fetches: Option<usize>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tcloud").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective project (CLI > config > gcloud default)
    pub fn effective_project(&self, gcloud: &GcloudProfiles) -> Option<String> {
        self.project_id
            .clone()
            .or_else(|| gcloud.settings(&ProfileSelection::DefaultChain).ok()?.project)
    }

    /// Get effective region (CLI > config > gcloud default > us-central1)
    pub fn effective_region(&self, gcloud: &GcloudProfiles) -> String {
        self.region
            .clone()
            .or_else(|| {
                gcloud
                    .settings(&ProfileSelection::DefaultChain)
                    .ok()?
                    .effective_region()
            })
            .unwrap_or_else(|| FALLBACK_REGION.to_string())
    }

    /// Concurrency cap, never below 1
    pub fn effective_max_concurrent_fetches(&self) -> usize {
        self.max_concurrent_fetches
            .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES)
            .max(1)
    }

    pub fn is_multi_region(&self) -> bool {
        self.regions.len() > 1
    }

    /// Configured profiles, or the default chain when none are set
    pub fn profile_selections(&self) -> Result<Vec<ProfileSelection>> {
        if self.profiles.is_empty() {
            return Ok(vec![ProfileSelection::DefaultChain]);
        }
        ProfileSelection::parse_all(&self.profiles)
    }

    /// Set project and save
    pub fn set_project(&mut self, project_id: &str) -> Result<()> {
        self.project_id = Some(project_id.to_string());
        self.save()
    }

    /// Set region and save
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        self.region = Some(region.to_string());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.effective_max_concurrent_fetches(), 50);
        assert!(!config.is_multi_region());
        assert_eq!(
            config.profile_selections().unwrap(),
            vec![ProfileSelection::DefaultChain]
        );
    }

    #[test]
    fn test_zero_cap_is_clamped() {
        let config = Config {
            max_concurrent_fetches: Some(0),
            ..Config::default()
        };
        assert_eq!(config.effective_max_concurrent_fetches(), 1);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"profiles": ["prod", "@env"], "max_concurrent_fetches": 8}"#)
                .unwrap();
        assert_eq!(config.effective_max_concurrent_fetches(), 8);
        assert!(config.project_id.is_none());
        assert_eq!(
            config.profile_selections().unwrap(),
            vec![
                ProfileSelection::Named("prod".into()),
                ProfileSelection::EnvironmentOnly
            ]
        );
    }

    #[test]
    fn test_effective_region_prefers_config() {
        let gcloud = GcloudProfiles::empty();
        let config = Config {
            region: Some("asia-east1".into()),
            ..Config::default()
        };
        assert_eq!(config.effective_region(&gcloud), "asia-east1");
        assert_eq!(Config::default().effective_region(&gcloud), FALLBACK_REGION);
    }
}

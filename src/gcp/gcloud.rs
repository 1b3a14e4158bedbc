//! gcloud configurations
//!
//! Reads project, region, zone and account for a [`ProfileSelection`] from
//! the environment and the gcloud configuration directory. Named profiles map
//! to `configurations/config_<name>`.

use crate::identity::profile::is_valid_profile_name;
use crate::identity::ProfileSelection;
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variables that can carry gcloud settings
const ENV_VARS: &[&str] = &[
    "CLOUDSDK_CONFIG",
    "CLOUDSDK_ACTIVE_CONFIG_NAME",
    "CLOUDSDK_CORE_PROJECT",
    "GOOGLE_CLOUD_PROJECT",
    "GCLOUD_PROJECT",
    "CLOUDSDK_CORE_ACCOUNT",
    "CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "CLOUDSDK_COMPUTE_REGION",
    "GOOGLE_CLOUD_REGION",
    "CLOUDSDK_COMPUTE_ZONE",
];

/// Project environment variables, in priority order
const PROJECT_VARS: &[&str] = &["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];

/// Settings resolved for one profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcloudSettings {
    pub project: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub account: Option<String>,
    /// `auth/credential_file_override`: a service account key to use instead of `account`
    pub credential_file: Option<PathBuf>,
}

impl GcloudSettings {
    /// Configured region, or the region of the configured zone
    pub fn effective_region(&self) -> Option<String> {
        self.region
            .clone()
            .or_else(|| self.zone.as_deref().map(region_from_zone))
    }

    /// Fill unset fields from `other`
    fn or(self, other: GcloudSettings) -> Self {
        Self {
            project: self.project.or(other.project),
            region: self.region.or(other.region),
            zone: self.zone.or(other.zone),
            account: self.account.or(other.account),
            credential_file: self.credential_file.or(other.credential_file),
        }
    }
}

/// Snapshot of gcloud settings sources, taken once per run
#[derive(Debug, Clone, Default)]
pub struct GcloudProfiles {
    config_dir: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl GcloudProfiles {
    /// Capture the process environment and locate the gcloud config directory
    pub fn discover() -> Self {
        let env = ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect::<HashMap<_, _>>();
        let config_dir = gcloud_config_dir(env.get("CLOUDSDK_CONFIG").map(String::as_str));
        Self { config_dir, env }
    }

    pub fn new(config_dir: Option<PathBuf>, env: HashMap<String, String>) -> Self {
        Self { config_dir, env }
    }

    /// No config directory and no environment
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// Service account key named by `GOOGLE_APPLICATION_CREDENTIALS`
    pub fn application_credentials(&self) -> Option<PathBuf> {
        self.env("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from)
    }

    /// Settings for `selection`
    pub fn settings(&self, selection: &ProfileSelection) -> Result<GcloudSettings> {
        match selection {
            ProfileSelection::EnvironmentOnly => Ok(self.env_settings()),
            ProfileSelection::DefaultChain => {
                let from_files = match self.active_configuration() {
                    Some(name) => self.configuration(&name).unwrap_or_default(),
                    None => GcloudSettings::default(),
                };
                Ok(self
                    .env_settings()
                    .or(from_files)
                    .or(self.legacy_properties()))
            }
            ProfileSelection::Named(name) => self.named_configuration(name),
        }
    }

    /// Names of all gcloud configurations on disk, sorted
    pub fn configuration_names(&self) -> Vec<String> {
        let Some(dir) = self.config_dir.as_ref().map(|d| d.join("configurations")) else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name().into_string().ok()?;
                let name = file_name.strip_prefix("config_")?;
                is_valid_profile_name(name).then(|| name.to_string())
            })
            .collect();
        names.sort();
        names
    }

    fn env(&self, name: &str) -> Option<String> {
        self.env.get(name).filter(|v| !v.trim().is_empty()).cloned()
    }

    fn env_settings(&self) -> GcloudSettings {
        let project = PROJECT_VARS.iter().find_map(|var| {
            let project = self.env(var)?;
            if validate_project_id(&project) {
                Some(project)
            } else {
                tracing::warn!("Invalid project ID format in {}", var);
                None
            }
        });

        GcloudSettings {
            project,
            region: self
                .env("CLOUDSDK_COMPUTE_REGION")
                .or_else(|| self.env("GOOGLE_CLOUD_REGION")),
            zone: self.env("CLOUDSDK_COMPUTE_ZONE"),
            account: self.env("CLOUDSDK_CORE_ACCOUNT"),
            credential_file: self
                .env("CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE")
                .map(PathBuf::from),
        }
    }

    /// Name of the active configuration, if one is set and valid
    fn active_configuration(&self) -> Option<String> {
        let name = match self.env("CLOUDSDK_ACTIVE_CONFIG_NAME") {
            Some(name) => name,
            None => {
                let path = self.config_dir.as_ref()?.join("active_config");
                std::fs::read_to_string(path).ok()?.trim().to_string()
            }
        };

        // Security: Validate config name to prevent path traversal
        if !is_valid_profile_name(&name) {
            tracing::warn!("Invalid characters in active_config name");
            return None;
        }
        Some(name)
    }

    fn named_configuration(&self, name: &str) -> Result<GcloudSettings> {
        if !is_valid_profile_name(name) {
            bail!("Invalid profile name: {:?}", name);
        }
        match self.configuration(name) {
            Some(settings) => Ok(settings),
            None => bail!("gcloud configuration '{}' not found", name),
        }
    }

    fn configuration(&self, name: &str) -> Option<GcloudSettings> {
        let path = self
            .config_dir
            .as_ref()?
            .join("configurations")
            .join(format!("config_{}", name));
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Cannot read gcloud configuration {:?}: {}", path, e);
                return None;
            }
        };
        Some(Properties::parse(&content).settings())
    }

    /// Pre-configuration gcloud installs keep settings in `properties`
    fn legacy_properties(&self) -> GcloudSettings {
        self.config_dir
            .as_ref()
            .and_then(|dir| std::fs::read_to_string(dir.join("properties")).ok())
            .map(|content| Properties::parse(&content).settings())
            .unwrap_or_default()
    }
}

/// Get the gcloud configuration directory
fn gcloud_config_dir(cloudsdk_config: Option<&str>) -> Option<PathBuf> {
    // Check CLOUDSDK_CONFIG environment variable first
    if let Some(path) = cloudsdk_config {
        return Some(PathBuf::from(path));
    }

    // Default to ~/.config/gcloud on Linux/macOS
    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// INI-style gcloud property file
struct Properties {
    values: HashMap<(String, String), String>,
}

impl Properties {
    fn parse(content: &str) -> Self {
        let mut values = HashMap::new();
        // Legacy files may omit the [core] header
        let mut section = "core".to_string();

        for line in content.lines() {
            let line = line.trim();
            // Security: Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(
                    (section.clone(), key.trim().to_string()),
                    value.trim().to_string(),
                );
            }
        }

        Self { values }
    }

    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .filter(|v| !v.is_empty())
            .cloned()
    }

    fn settings(&self) -> GcloudSettings {
        let project = self.get("core", "project").filter(|p| {
            let valid = validate_project_id(p);
            if !valid {
                tracing::warn!("Invalid project ID format in gcloud configuration");
            }
            valid
        });

        GcloudSettings {
            project,
            region: self.get("compute", "region"),
            zone: self.get("compute", "zone"),
            account: self.get("core", "account"),
            credential_file: self
                .get("auth", "credential_file_override")
                .map(PathBuf::from),
        }
    }
}

/// Validate a GCP project ID format
/// Project IDs must be 6-30 characters, lowercase letters, digits, and hyphens
/// Must start with a letter and cannot end with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    // Must start with a letter
    if !project.starts_with(|c: char| c.is_ascii_lowercase()) {
        return false;
    }

    // Must not end with a hyphen
    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// "us-central1-a" -> "us-central1"
pub fn region_from_zone(zone: &str) -> String {
    match zone.rsplit_once('-') {
        Some((region, _)) => region.to_string(),
        None => zone.to_string(),
    }
}

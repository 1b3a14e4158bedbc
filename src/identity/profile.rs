//! Credential contexts ("profile selections")

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

/// Key used for [`ProfileSelection::DefaultChain`]
pub const DEFAULT_CHAIN_KEY: &str = "@default";

/// Key used for [`ProfileSelection::EnvironmentOnly`]
pub const ENVIRONMENT_ONLY_KEY: &str = "@env";

/// Where a context's credentials and settings come from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProfileSelection {
    /// The provider's default resolution chain (env, active gcloud configuration, ADC)
    DefaultChain,
    /// Environment variables and instance metadata only, no config files
    EnvironmentOnly,
    /// A named gcloud configuration
    Named(String),
}

impl ProfileSelection {
    /// Validated named profile
    pub fn named(name: &str) -> Result<Self> {
        if !is_valid_profile_name(name) {
            bail!("Invalid profile name: {:?}", name);
        }
        Ok(Self::Named(name.to_string()))
    }

    /// Stable map key, derived from the variant only
    pub fn key(&self) -> &str {
        match self {
            Self::DefaultChain => DEFAULT_CHAIN_KEY,
            Self::EnvironmentOnly => ENVIRONMENT_ONLY_KEY,
            Self::Named(name) => name,
        }
    }

    /// Parse a list of profile arguments, dropping duplicates but keeping order
    pub fn parse_all<S: AsRef<str>>(values: &[S]) -> Result<Vec<Self>> {
        let mut selections: Vec<Self> = Vec::with_capacity(values.len());
        for value in values {
            let selection = value.as_ref().parse()?;
            if !selections.contains(&selection) {
                selections.push(selection);
            }
        }
        Ok(selections)
    }
}

impl fmt::Display for ProfileSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ProfileSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            DEFAULT_CHAIN_KEY => Ok(Self::DefaultChain),
            ENVIRONMENT_ONLY_KEY => Ok(Self::EnvironmentOnly),
            name => Self::named(name),
        }
    }
}

/// Profile names map to file names, so keep them to a safe alphabet
pub(crate) fn is_valid_profile_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

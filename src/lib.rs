//! tcloud - paginated fetching and multi-profile identity resolution for GCP
//!
//! - [`fetch`] - eager paginators, the lazy page iterator and the bounded collector
//! - [`identity`] - profile selections and the concurrent identity resolver
//! - [`gcp`] - Google Cloud REST bindings for both
//! - [`config`] - persisted user configuration

pub mod config;
pub mod fetch;
pub mod gcp;
pub mod identity;

/// Version injected at compile time via TCLOUD_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("TCLOUD_VERSION") {
    Some(v) => v,
    None => "dev",
};

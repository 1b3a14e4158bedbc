//! Identity resolution across credential contexts
//!
//! - [`profile`] - [`ProfileSelection`], the credential context value type
//! - [`resolver`] - [`Resolver`], the bounded-concurrency multi-profile resolver
//!
//! The resolver returns a [`Resolution`] and never stores it; the caller
//! decides where identity state lives and how partial failures are shown.

pub mod profile;
pub mod resolver;

pub use profile::{ProfileSelection, DEFAULT_CHAIN_KEY, ENVIRONMENT_ONLY_KEY};
pub use resolver::{
    IdentitySource, Resolution, ResolveError, Resolver, DEFAULT_MAX_CONCURRENT_FETCHES,
};

//! Fetch errors

use thiserror::Error;

/// Error returned by the paginators and the lazy iterator
#[derive(Error, Debug)]
pub enum FetchError {
    /// The cancellation token fired before the next page was requested
    #[error("Fetch cancelled")]
    Cancelled,

    /// The page fetcher failed; the error is passed through unchanged
    #[error(transparent)]
    Fetch(#[from] anyhow::Error),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

//! Eager paginators
//!
//! Drain a [`PageFetcher`] into a single ordered `Vec`. Fail-fast: the first
//! fetch error or a fired cancellation token aborts the whole walk.

use super::error::FetchError;
use super::page::PageFetcher;
use tokio_util::sync::CancellationToken;

/// Fetch every page of a `pageToken`/`nextPageToken` style API
pub async fn paginate<T, F>(cancel: &CancellationToken, fetcher: F) -> Result<Vec<T>, FetchError>
where
    F: PageFetcher<T>,
{
    drain(cancel, fetcher, "token").await
}

/// Fetch every page of a `marker`/`nextMarker` style API
///
/// Same termination and error semantics as [`paginate`].
pub async fn paginate_marker<T, F>(
    cancel: &CancellationToken,
    fetcher: F,
) -> Result<Vec<T>, FetchError>
where
    F: PageFetcher<T>,
{
    drain(cancel, fetcher, "marker").await
}

async fn drain<T, F>(
    cancel: &CancellationToken,
    mut fetcher: F,
    cursor_kind: &'static str,
) -> Result<Vec<T>, FetchError>
where
    F: PageFetcher<T>,
{
    let mut all_items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if cancel.is_cancelled() {
            tracing::debug!("{} pagination cancelled after {} pages", cursor_kind, pages);
            return Err(FetchError::Cancelled);
        }

        let (items, next) = fetcher.fetch(cursor.take()).await?.into_parts();
        pages += 1;
        all_items.extend(items);

        match next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    tracing::debug!(
        "{} pagination finished: {} items in {} pages",
        cursor_kind,
        all_items.len(),
        pages
    );

    Ok(all_items)
}

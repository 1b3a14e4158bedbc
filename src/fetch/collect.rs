//! Bounded collector over a [`PageIter`]

use super::error::FetchError;
use super::iter::PageIter;
use super::page::PageFetcher;

/// Items gathered by [`collect`], plus the error that stopped it, if any
#[derive(Debug)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub error: Option<FetchError>,
}

impl<T> Collected<T> {
    /// Drop the partial items when an error occurred
    pub fn into_result(self) -> Result<Vec<T>, FetchError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.items),
        }
    }
}

/// Gather up to `limit` items from `iter` (`0` means everything)
///
/// Stops advancing the iterator as soon as `limit` items are in hand, so a
/// page that satisfies the limit is never followed by another fetch. The
/// iterator is borrowed: calling `collect` again continues where this call
/// stopped.
pub async fn collect<T, F>(iter: &mut PageIter<T, F>, limit: usize) -> Collected<T>
where
    F: PageFetcher<T>,
{
    let mut items = Vec::new();

    while limit == 0 || items.len() < limit {
        match iter.next().await {
            Some(Ok(item)) => items.push(item),
            Some(Err(e)) => {
                return Collected {
                    items,
                    error: Some(e),
                }
            }
            None => break,
        }
    }

    Collected { items, error: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::page::{fetch_fn, Page};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    /// Five items per page, `total_pages` pages
    fn five_per_page(total_pages: usize, calls: Arc<AtomicUsize>) -> impl PageFetcher<usize> {
        fetch_fn(move |_cursor: Option<String>| {
            let calls = calls.clone();
            async move {
                let page = calls.fetch_add(1, Ordering::SeqCst);
                let items: Vec<usize> = (page * 5..page * 5 + 5).collect();
                let next = (page + 1 < total_pages).then(|| format!("{}", page + 1));
                Ok::<_, anyhow::Error>(Page::new(items, next))
            }
        })
    }

    #[tokio::test]
    async fn test_limit_within_first_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut iter = PageIter::new(CancellationToken::new(), five_per_page(10, calls.clone()));

        let collected = collect(&mut iter, 3).await;

        assert_eq!(collected.into_result().unwrap(), vec![0, 1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_limit_equal_to_page_size() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut iter = PageIter::new(CancellationToken::new(), five_per_page(10, calls.clone()));

        let collected = collect(&mut iter, 5).await;

        assert_eq!(collected.items.len(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_limit_drains() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut iter = PageIter::new(CancellationToken::new(), five_per_page(4, calls.clone()));

        let collected = collect(&mut iter, 0).await;

        assert!(collected.error.is_none());
        assert_eq!(collected.items, (0..20).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_load_more_continues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut iter = PageIter::new(CancellationToken::new(), five_per_page(10, calls.clone()));

        let first = collect(&mut iter, 3).await.into_result().unwrap();
        let second = collect(&mut iter, 3).await.into_result().unwrap();

        assert_eq!(first, vec![0, 1, 2]);
        assert_eq!(second, vec![3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_keeps_partial_items() {
        let fetcher = fetch_fn(|cursor: Option<String>| async move {
            match cursor {
                None => Ok(Page::new(vec![1, 2], Some("2".to_string()))),
                Some(_) => Err(anyhow::anyhow!("API request failed: 500")),
            }
        });
        let mut iter = PageIter::new(CancellationToken::new(), fetcher);

        let collected = collect(&mut iter, 10).await;

        assert_eq!(collected.items, vec![1, 2]);
        assert!(matches!(collected.error, Some(FetchError::Fetch(_))));
    }
}

//! Page Fetcher contract
//!
//! A [`PageFetcher`] performs exactly one call against a paged API per
//! invocation. Resource listings implement it directly or wrap an async
//! closure with [`fetch_fn`].

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;

/// One batch of items plus the cursor for the next batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<String>) -> Self {
        Self { items, next }
    }

    /// A page with no continuation
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    /// Marker-style APIs name the cursor "next marker"; same semantics.
    pub fn with_marker(items: Vec<T>, next_marker: Option<String>) -> Self {
        Self::new(items, next_marker)
    }

    /// The cursor to continue with, if any. Empty cursors end pagination.
    pub fn next_cursor(&self) -> Option<&str> {
        self.next.as_deref().filter(|c| !c.is_empty())
    }

    pub(crate) fn into_parts(self) -> (Vec<T>, Option<String>) {
        let next = normalize_cursor(self.next);
        (self.items, next)
    }
}

/// Treat an empty cursor the same as an absent one
pub fn normalize_cursor(cursor: Option<String>) -> Option<String> {
    cursor.filter(|c| !c.is_empty())
}

/// One page of an external paged API
#[async_trait]
pub trait PageFetcher<T>: Send {
    /// Fetch the page starting at `cursor` (`None` for the first page)
    async fn fetch(&mut self, cursor: Option<String>) -> Result<Page<T>>;
}

#[async_trait]
impl<T, P> PageFetcher<T> for &mut P
where
    P: PageFetcher<T> + ?Sized,
{
    async fn fetch(&mut self, cursor: Option<String>) -> Result<Page<T>> {
        (**self).fetch(cursor).await
    }
}

/// Adapter turning an async closure into a [`PageFetcher`]
pub struct FnFetcher<F> {
    f: F,
}

/// Wrap `f` so it can be passed to the paginators
///
/// ```ignore
/// let items = paginate(&cancel, fetch_fn(|cursor| async move {
///     client.list_page(cursor).await
/// })).await?;
/// ```
pub fn fetch_fn<F, Fut>(f: F) -> FnFetcher<F>
where
    F: FnMut(Option<String>) -> Fut,
{
    FnFetcher { f }
}

#[async_trait]
impl<T, F, Fut> PageFetcher<T> for FnFetcher<F>
where
    F: FnMut(Option<String>) -> Fut + Send,
    Fut: Future<Output = Result<Page<T>>> + Send,
    T: Send,
{
    async fn fetch(&mut self, cursor: Option<String>) -> Result<Page<T>> {
        (self.f)(cursor).await
    }
}

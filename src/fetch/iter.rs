//! Lazy page iterator
//!
//! [`PageIter`] hands out items one at a time and only asks the fetcher for
//! another page once the buffered page is exhausted and the consumer calls
//! [`PageIter::next`] again. Stopping early never costs an extra fetch.

use super::error::FetchError;
use super::page::PageFetcher;
use futures::Stream;
use std::collections::VecDeque;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// No page requested yet
    Start,
    /// More pages available at the cursor
    Continue(String),
    /// Last page fetched, or an error was yielded
    Done,
}

/// Single-pass, on-demand iterator over a paged API
pub struct PageIter<T, F> {
    fetcher: F,
    cancel: CancellationToken,
    buffer: VecDeque<T>,
    state: State,
    pages_fetched: usize,
    _item: PhantomData<fn() -> T>,
}

impl<T, F> PageIter<T, F>
where
    F: PageFetcher<T>,
{
    pub fn new(cancel: CancellationToken, fetcher: F) -> Self {
        Self {
            fetcher,
            cancel,
            buffer: VecDeque::new(),
            state: State::Start,
            pages_fetched: 0,
            _item: PhantomData,
        }
    }

    /// Number of fetch calls issued so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// True once the last page has been handed out or an error was yielded
    pub fn is_exhausted(&self) -> bool {
        self.buffer.is_empty() && self.state == State::Done
    }

    /// Next item, fetching the next page only when the buffer is empty
    ///
    /// Yields `Some(Err(_))` at most once; the iterator is finished after it.
    pub async fn next(&mut self) -> Option<Result<T, FetchError>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }

            let cursor = match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::Start => None,
                State::Continue(cursor) => Some(cursor),
            };

            if self.cancel.is_cancelled() {
                tracing::debug!("page iteration cancelled after {} pages", self.pages_fetched);
                return Some(Err(FetchError::Cancelled));
            }

            self.pages_fetched += 1;
            match self.fetcher.fetch(cursor).await {
                Ok(page) => {
                    let (items, next) = page.into_parts();
                    tracing::debug!(
                        "fetched page {} ({} items, more: {})",
                        self.pages_fetched,
                        items.len(),
                        next.is_some()
                    );
                    self.buffer.extend(items);
                    if let Some(next) = next {
                        self.state = State::Continue(next);
                    }
                }
                Err(e) => return Some(Err(FetchError::Fetch(e))),
            }
        }
    }

    /// Adapt into a [`Stream`] with the same on-demand semantics
    pub fn into_stream(self) -> impl Stream<Item = Result<T, FetchError>> {
        futures::stream::unfold(self, |mut iter| async move {
            let item = iter.next().await?;
            Some((item, iter))
        })
    }
}

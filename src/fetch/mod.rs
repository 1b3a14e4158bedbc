//! Paginated fetch engine
//!
//! Generic utilities every resource listing uses to walk paged API results.
//!
//! # Module Structure
//!
//! - [`page`] - The [`PageFetcher`] contract and the [`fetch_fn`] closure adapter
//! - [`paginate`](mod@paginate) - Eager paginators that drain every page
//! - [`iter`] - [`PageIter`], the lazy on-demand iterator
//! - [`collect`](mod@collect) - Bounded collection over a [`PageIter`]
//!
//! Cursors follow one rule everywhere: an absent cursor and an empty cursor
//! both mean there are no further pages. Cancellation is checked before each
//! fetch; a fetch already in flight is never interrupted.
//!
//! # Example
//!
//! ```ignore
//! use tcloud::fetch::{fetch_fn, paginate, Page};
//!
//! let names = paginate(&cancel, fetch_fn(|cursor| async move {
//!     let response = api.list(cursor).await?;
//!     Ok(Page::new(response.names, response.next_page_token))
//! }))
//! .await?;
//! ```

pub mod collect;
pub mod error;
pub mod iter;
pub mod page;
pub mod paginate;

pub use collect::{collect, Collected};
pub use error::FetchError;
pub use iter::PageIter;
pub use page::{fetch_fn, normalize_cursor, FnFetcher, Page, PageFetcher};
pub use paginate::{paginate, paginate_marker};

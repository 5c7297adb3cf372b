//! Cursor-based traversal of paged collection endpoints.
//!
//! [`pages`] turns a `fetch(page_index)` function into a lazy stream of
//! [`ResourcePage`]s. Fetching starts at page 1, advances one page per
//! non-empty result and stops at the first empty page, which is the
//! end-of-collection sentinel. Nothing is requested until the stream is
//! polled, and a fetch error is yielded once and ends the stream.

use std::future::Future;

use futures::stream::{self, Stream, TryStreamExt};
use tracing::debug;

use crate::error::SyncError;

pub const FIRST_PAGE: u32 = 1;

/// One non-empty page of a collection, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePage<T> {
    pub index: u32,
    pub items: Vec<T>,
}

pub fn pages<T, F, Fut>(fetch: F) -> impl Stream<Item = Result<ResourcePage<T>, SyncError>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, SyncError>>,
{
    stream::try_unfold((fetch, FIRST_PAGE), |(mut fetch, index)| async move {
        let items = fetch(index).await?;
        if items.is_empty() {
            debug!(page = index, "End of collection");
            return Ok::<_, SyncError>(None);
        }
        debug!(page = index, items = items.len(), "Fetched page");
        Ok::<_, SyncError>(Some((ResourcePage { index, items }, (fetch, index + 1))))
    })
}

/// Items of every page, flattened in server order.
pub fn items<T, F, Fut>(fetch: F) -> impl Stream<Item = Result<T, SyncError>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, SyncError>>,
{
    pages(fetch)
        .map_ok(|page| stream::iter(page.items.into_iter().map(Ok)))
        .try_flatten()
}

/// Drains a whole collection into memory.
pub async fn collect_all<T, F, Fut>(fetch: F) -> Result<Vec<T>, SyncError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, SyncError>>,
{
    items(fetch).try_collect().await
}

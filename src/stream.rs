//! The streaming engine: drives a query across every page as an ordered,
//! backpressured [`futures_core::Stream`]
//!
//! [`stream_query`] is the single producer of a stream's items: it owns the
//! cursor, retries transient page failures with a linear backoff, and stops
//! once a page exhausts its retries, unless an
//! [`StreamOptions::error_observer`] asks it to keep retrying that page. A
//! per-item deserialization failure is surfaced as an `Err` item but never
//! ends the stream by itself. Call [`crate::store::Store::stream`] for the
//! typed, per-entity entry point; this function is the free form used when a
//! query's items may not all be the same Rust type.

use std::{sync::Arc, time::Duration};

use async_stream::stream;
use futures_core::Stream;
use tokio_util::sync::CancellationToken;

use crate::{executor, query::QueryParams, store, Error, Table};

/// The position of one item within a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMeta {
    /// Strictly increasing across the whole stream, starting at zero
    pub index: u64,

    /// The page this item was read from, starting at one; weakly increasing
    pub page_number: u32,

    /// When this item was read off the wire
    pub observed_at: time::OffsetDateTime,
}

/// One item read from a stream, alongside its position
#[derive(Debug, Clone)]
pub struct StreamItem<T> {
    /// The deserialized item
    pub item: T,

    /// Where this item fell in the stream
    pub meta: StreamMeta,
}

/// Progress reported after each page is fetched
#[derive(Debug, Clone, Copy)]
pub struct StreamProgress {
    /// The page just completed, starting at one
    pub page_number: u32,

    /// The number of items the page yielded
    pub items_in_page: usize,

    /// The number of items the provider scanned before filtering
    pub scanned_count: i32,

    /// Whether the provider indicated more pages remain
    pub has_more: bool,
}

/// Called after each page completes, for progress reporting; never
/// consulted for control flow
pub type ProgressObserver = Arc<dyn Fn(StreamProgress) + Send + Sync>;

/// Called when a page exhausts its retries; returns `true` to retry the
/// same page again (after another `retry_backoff_base` delay) or `false` to
/// surface the error and end the stream
pub type ErrorObserver = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Tuning knobs for [`stream_query`]
#[derive(Clone)]
#[must_use]
pub struct StreamOptions {
    buffer_size: usize,
    page_size: u32,
    max_retries: u32,
    retry_backoff_base: Duration,
    cancellation: CancellationToken,
    progress_observer: Option<ProgressObserver>,
    error_observer: Option<ErrorObserver>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            page_size: 100,
            max_retries: 3,
            retry_backoff_base: Duration::from_secs(1),
            cancellation: CancellationToken::new(),
            progress_observer: None,
            error_observer: None,
        }
    }
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("buffer_size", &self.buffer_size)
            .field("page_size", &self.page_size)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base", &self.retry_backoff_base)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("progress_observer", &self.progress_observer.is_some())
            .field("error_observer", &self.error_observer.is_some())
            .finish()
    }
}

impl StreamOptions {
    /// Start with the default tuning (buffer 100, page size 100, 3 retries
    /// at a 1 second linear backoff, no observers)
    pub fn new() -> Self {
        Self::default()
    }

    /// How many items may be buffered ahead of the consumer
    ///
    /// Only meaningful as a hint today, since the current implementation
    /// pulls pages lazily rather than through a separate buffering task;
    /// kept as a tuning knob for a future bounded-channel producer.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// How many items each page requests
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// How many times a failed page is retried before giving up
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The base delay for the linear retry backoff: attempt `n` waits
    /// `(n + 1) * retry_backoff_base`
    pub fn retry_backoff_base(mut self, retry_backoff_base: Duration) -> Self {
        self.retry_backoff_base = retry_backoff_base;
        self
    }

    /// The handle used to cooperatively cancel the stream
    pub fn cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Report progress after each page
    pub fn progress_observer(mut self, observer: ProgressObserver) -> Self {
        self.progress_observer = Some(observer);
        self
    }

    /// Decide whether to keep retrying a page or give up and end the
    /// stream with an error once its retries are exhausted
    pub fn error_observer(mut self, observer: ErrorObserver) -> Self {
        self.error_observer = Some(observer);
        self
    }
}

/// Drive `params` across every page against `table`, deserializing each
/// item as `U` via [`store::deserialize_item`]
///
/// A per-item deserialization failure yields `Err` for that item and keeps
/// going; it never ends the stream on its own. A page fetch that exhausts
/// its retries yields `Err` and ends the stream, unless
/// [`StreamOptions::error_observer`] asks to keep retrying that same page.
/// Otherwise the stream ends once the provider reports no further pages.
pub fn stream_query<'a, U, Tb>(
    table: &'a Tb,
    mut params: QueryParams,
    options: StreamOptions,
) -> impl Stream<Item = Result<StreamItem<U>, Error>> + 'a
where
    U: serde::de::DeserializeOwned + Send + Sync + 'static,
    Tb: Table,
{
    stream! {
        let mut index: u64 = 0;
        let mut page_number: u32 = 0;
        let mut cursor = None;
        params = params.limit(options.page_size);

        loop {
            if options.cancellation.is_cancelled() {
                yield Err(Error::cancelled());
                return;
            }

            let mut request = params.clone();
            if let Some(cursor) = cursor.clone() {
                request = request.exclusive_start_key(cursor);
            }

            let page = loop {
                match fetch_with_retry(table, request.clone(), &options).await {
                    Ok(page) => break page,
                    Err(err) => {
                        let should_continue = options
                            .error_observer
                            .as_ref()
                            .is_some_and(|observer| observer(&err));
                        if !should_continue {
                            yield Err(err);
                            return;
                        }
                        if options.cancellation.is_cancelled() {
                            yield Err(Error::cancelled());
                            return;
                        }
                        tokio::time::sleep(options.retry_backoff_base).await;
                    }
                }
            };

            page_number += 1;

            let has_more = page.last_evaluated_key.is_some();
            let items_in_page = page.items.len();

            for item in page.items {
                let observed_at = time::OffsetDateTime::now_utc();
                match store::deserialize_item::<U>(item) {
                    Ok(item) => {
                        yield Ok(StreamItem {
                            item,
                            meta: StreamMeta {
                                index,
                                page_number,
                                observed_at,
                            },
                        });
                        index += 1;
                    }
                    Err(err) => {
                        // Non-fatal: this item is unreadable, but the rest of
                        // the page and subsequent pages are still delivered.
                        yield Err(err);
                    }
                }
            }

            if let Some(observer) = &options.progress_observer {
                observer(StreamProgress {
                    page_number,
                    items_in_page,
                    scanned_count: page.scanned_count,
                    has_more,
                });
            }

            match page.last_evaluated_key {
                Some(next) => cursor = Some(next),
                None => return,
            }
        }
    }
}

async fn fetch_with_retry<Tb: Table>(
    table: &Tb,
    params: QueryParams,
    options: &StreamOptions,
) -> Result<executor::Page, Error> {
    let mut attempt = 0;
    loop {
        match executor::execute(table, params.clone()).await {
            Ok(page) => return Ok(page),
            Err(err) if err.is_transient() && attempt < options.max_retries => {
                tokio::time::sleep(options.retry_backoff_base * (attempt + 1)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_the_documented_tuning() {
        let options = StreamOptions::new();
        assert_eq!(options.buffer_size, 100);
        assert_eq!(options.page_size, 100);
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.retry_backoff_base, Duration::from_secs(1));
        assert!(!options.cancellation.is_cancelled());
    }

    #[test]
    fn cancellation_token_can_be_shared_and_observed() {
        let token = CancellationToken::new();
        let options = StreamOptions::new().cancellation(token.clone());
        token.cancel();
        assert!(options.cancellation.is_cancelled());
    }
}

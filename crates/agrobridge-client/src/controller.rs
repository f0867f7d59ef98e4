//! Async driver for a category feed.
//!
//! [`ProductFeed`] owns a [`FeedState`] behind a `std::sync::Mutex` and a
//! [`CategorySource`]. The lock is only taken between awaits, so a second
//! concurrent [`ProductFeed::fetch_next`] sees the in-flight slot taken and
//! returns [`FetchOutcome::Skipped`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use agrobridge_core::{CategoryQuery, Coordinates};
use tokio::sync::watch;

use crate::client::CategorySource;
use crate::error::ClientError;
use crate::feed::{Completion, FeedSnapshot, FeedState, FetchTicket, SkipReason};
use crate::merge::MergeReport;

/// Upper bound on pages fetched by one [`ProductFeed::fetch_to_end`] call.
pub const MAX_PAGES: u32 = 200;

#[derive(Debug)]
pub enum FetchOutcome {
    Applied(MergeReport),
    Skipped(SkipReason),
    /// The location changed while the page was loading.
    Stale,
    Failed(ClientError),
}

pub struct ProductFeed<S: CategorySource> {
    source: S,
    category: String,
    page_size: u32,
    max_pages: u32,
    state: Mutex<FeedState<S::Record>>,
}

impl<S: CategorySource> std::fmt::Debug for ProductFeed<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductFeed")
            .field("category", &self.category)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

impl<S: CategorySource> ProductFeed<S> {
    pub fn new(
        source: S,
        category: impl Into<String>,
        page_size: u32,
        location: Option<Coordinates>,
    ) -> Self {
        Self {
            source,
            category: agrobridge_core::normalize_category(&category.into()),
            page_size: page_size.max(1),
            max_pages: MAX_PAGES,
            state: Mutex::new(FeedState::new(location)),
        }
    }

    /// Overrides [`MAX_PAGES`] for this feed.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, FeedState<S::Record>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears both lists and starts again from page 1 at `location`.
    ///
    /// A fetch still in flight is not cancelled here, but its response will
    /// be discarded as stale.
    pub fn reset(&self, location: Option<Coordinates>) {
        let mut state = self.lock();
        state.reset(location);
        tracing::debug!(
            category = %self.category,
            generation = state.generation(),
            location = ?location,
            "feed reset"
        );
    }

    /// Loads the next page and merges it.
    pub async fn fetch_next(&self) -> FetchOutcome {
        let begun = self.lock().begin_fetch();
        let ticket = match begun {
            Ok(ticket) => ticket,
            Err(reason) => return FetchOutcome::Skipped(reason),
        };

        let query = CategoryQuery {
            category: self.category.clone(),
            page: ticket.page,
            page_size: self.page_size,
            location: ticket.location,
        };
        let guard = InFlightGuard {
            state: &self.state,
            ticket,
            armed: true,
        };
        let result = self.source.fetch_page(&query).await;
        let ticket = guard.disarm();

        match result {
            Ok(page) => {
                let rejected = page.rejected;
                let completion = self.lock().complete_fetch(&ticket, page);
                match completion {
                    Completion::Applied(report) => {
                        tracing::debug!(
                            category = %self.category,
                            page = ticket.page,
                            generation = ticket.generation,
                            deliverable_added = report.deliverable_added,
                            non_deliverable_added = report.non_deliverable_added,
                            conflicts_dropped = report.conflicts_dropped,
                            rejected,
                            "page merged"
                        );
                        FetchOutcome::Applied(report)
                    }
                    Completion::Stale => {
                        tracing::debug!(
                            category = %self.category,
                            page = ticket.page,
                            generation = ticket.generation,
                            "discarding page from previous location"
                        );
                        FetchOutcome::Stale
                    }
                }
            }
            Err(e) => {
                self.lock().abort_fetch(&ticket);
                tracing::warn!(
                    error = %e,
                    category = %self.category,
                    page = ticket.page,
                    "category page fetch failed"
                );
                FetchOutcome::Failed(e)
            }
        }
    }

    /// Fetches pages back-to-back until the end is reached, another fetch
    /// holds the slot, the location changes or the page cap is hit. Returns
    /// the number of pages merged.
    ///
    /// # Errors
    ///
    /// Returns the source's [`ClientError`] for the first page that fails.
    pub async fn fetch_to_end(&self) -> Result<u32, ClientError> {
        let mut merged = 0;
        loop {
            if merged >= self.max_pages {
                tracing::warn!(
                    category = %self.category,
                    pages = merged,
                    "page cap reached before the end of results"
                );
                return Ok(merged);
            }
            match self.fetch_next().await {
                FetchOutcome::Applied(_) => merged += 1,
                FetchOutcome::Skipped(_) | FetchOutcome::Stale => return Ok(merged),
                FetchOutcome::Failed(e) => return Err(e),
            }
        }
    }

    /// Keeps the feed in step with `location` until its sender is dropped.
    ///
    /// Resets on the current value, then pages to the end. A location change
    /// cancels the fetch in progress and starts over.
    pub async fn run(&self, mut location: watch::Receiver<Option<Coordinates>>) {
        let initial = *location.borrow_and_update();
        self.reset(initial);

        loop {
            let finished = tokio::select! {
                result = self.fetch_to_end() => {
                    match result {
                        Ok(pages) => tracing::debug!(category = %self.category, pages, "feed idle"),
                        Err(e) => tracing::warn!(
                            error = %e,
                            category = %self.category,
                            "feed paused until the location changes"
                        ),
                    }
                    true
                }
                changed = location.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    false
                }
            };

            if finished && location.changed().await.is_err() {
                return;
            }
            let next = *location.borrow_and_update();
            self.reset(next);
        }
    }
}

impl<S> ProductFeed<S>
where
    S: CategorySource,
    S::Record: Clone,
{
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot<S::Record> {
        self.lock().snapshot()
    }
}

/// Releases the in-flight slot if a fetch is dropped before it completes.
struct InFlightGuard<'a, T> {
    state: &'a Mutex<FeedState<T>>,
    ticket: FetchTicket,
    armed: bool,
}

impl<T> InFlightGuard<'_, T> {
    fn disarm(mut self) -> FetchTicket {
        self.armed = false;
        self.ticket.clone()
    }
}

impl<T> Drop for InFlightGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .abort_fetch(&self.ticket);
        }
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;

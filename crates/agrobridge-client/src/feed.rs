//! Pagination state of a location-filtered category feed.
//!
//! [`FeedState`] is synchronous and owns no I/O: a fetch is split into
//! [`FeedState::begin_fetch`], which hands out a [`FetchTicket`], and
//! [`FeedState::complete_fetch`] / [`FeedState::abort_fetch`]. The async
//! driver lives in [`crate::controller`].

use agrobridge_core::Coordinates;

use crate::client::ParsedPage;
use crate::identity::Identify;
use crate::merge::{MergeReport, ProductLists};

/// Why a fetch did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another fetch for this feed has not finished.
    InFlight,
    /// The last page has been merged.
    ReachedEnd,
    /// No usable buyer location yet.
    NoLocation,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InFlight => write!(f, "fetch already in flight"),
            SkipReason::ReachedEnd => write!(f, "end of results reached"),
            SkipReason::NoLocation => write!(f, "no usable location"),
        }
    }
}

/// Permission to run one fetch, tied to the location generation it began in.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub page: u32,
    pub location: Coordinates,
    seq: u64,
}

/// Result of handing a finished fetch back to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied(MergeReport),
    /// The location changed while the fetch was in flight; nothing was merged.
    Stale,
}

#[derive(Debug)]
pub struct FeedState<T> {
    lists: ProductLists<T>,
    page: u32,
    is_reaching_end: bool,
    in_flight: Option<u64>,
    next_seq: u64,
    generation: u64,
    location: Option<Coordinates>,
    rejected_records: u64,
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        Self {
            lists: ProductLists::default(),
            page: 1,
            is_reaching_end: false,
            in_flight: None,
            next_seq: 0,
            generation: 0,
            location: None,
            rejected_records: 0,
        }
    }
}

impl<T> FeedState<T> {
    #[must_use]
    pub fn new(location: Option<Coordinates>) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn is_reaching_end(&self) -> bool {
        self.is_reaching_end
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn location(&self) -> Option<Coordinates> {
        self.location
    }

    /// Records dropped for lacking an identity since the feed was created.
    #[must_use]
    pub fn rejected_records(&self) -> u64 {
        self.rejected_records
    }

    /// Claims the in-flight slot for the next page.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] when a fetch is already in flight, the end
    /// has been reached, or the location is missing or unusable.
    pub fn begin_fetch(&mut self) -> Result<FetchTicket, SkipReason> {
        if self.in_flight.is_some() {
            return Err(SkipReason::InFlight);
        }
        if self.is_reaching_end {
            return Err(SkipReason::ReachedEnd);
        }
        let location = self
            .location
            .filter(Coordinates::is_usable)
            .ok_or(SkipReason::NoLocation)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight = Some(seq);

        Ok(FetchTicket {
            generation: self.generation,
            page: self.page,
            location,
            seq,
        })
    }

    /// Releases the in-flight slot without touching lists or page.
    pub fn abort_fetch(&mut self, ticket: &FetchTicket) {
        self.release(ticket);
    }

    fn release(&mut self, ticket: &FetchTicket) {
        if self.in_flight == Some(ticket.seq) {
            self.in_flight = None;
        }
    }
}

impl<T: Identify> FeedState<T> {
    #[must_use]
    pub fn lists(&self) -> &ProductLists<T> {
        &self.lists
    }

    /// Merges a fetched page, unless the location changed since `ticket` was
    /// issued.
    pub fn complete_fetch(&mut self, ticket: &FetchTicket, page: ParsedPage<T>) -> Completion {
        if ticket.generation != self.generation {
            return Completion::Stale;
        }
        self.release(ticket);

        self.rejected_records += page.rejected as u64;
        self.is_reaching_end = !page.lists.has_more;
        let report = self.lists.apply(page.lists);
        self.page += 1;

        Completion::Applied(report)
    }

    /// Starts over for a new location: clears both lists, returns to page 1
    /// and invalidates any fetch still in flight.
    pub fn reset(&mut self, location: Option<Coordinates>) {
        self.lists.clear();
        self.page = 1;
        self.is_reaching_end = false;
        self.in_flight = None;
        self.generation += 1;
        self.location = location;
    }
}

impl<T: Identify + Clone> FeedState<T> {
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot<T> {
        FeedSnapshot {
            deliverable: self.lists.deliverable().as_slice().to_vec(),
            non_deliverable: self.lists.non_deliverable().as_slice().to_vec(),
            page: self.page,
            is_reaching_end: self.is_reaching_end,
            is_fetching: self.is_fetching(),
            generation: self.generation,
            location: self.location,
            rejected_records: self.rejected_records,
        }
    }
}

/// Everything a renderer needs from a feed at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot<T> {
    pub deliverable: Vec<T>,
    pub non_deliverable: Vec<T>,
    pub page: u32,
    pub is_reaching_end: bool,
    pub is_fetching: bool,
    pub generation: u64,
    pub location: Option<Coordinates>,
    pub rejected_records: u64,
}

impl<T> FeedSnapshot<T> {
    /// Show "no more products" once the end is known and nothing is loading.
    #[must_use]
    pub fn shows_end_message(&self) -> bool {
        self.is_reaching_end && !self.is_fetching
    }
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;

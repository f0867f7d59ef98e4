//! Buyer-side marketplace feed: category queries, identity normalization,
//! deliverable/non-deliverable merging and location-driven pagination.

pub mod cart;
pub mod client;
pub mod controller;
pub mod error;
pub mod feed;
pub mod identity;
pub mod location;
pub mod merge;

pub use cart::LocalCart;
pub use client::{parse_category_body, CategoryClient, CategorySource, ParsedPage, SafeDefault};
pub use controller::{FetchOutcome, ProductFeed, MAX_PAGES};
pub use error::{ClientError, RecordError};
pub use feed::{Completion, FeedSnapshot, FeedState, FetchTicket, SkipReason};
pub use identity::{derive_identity, Identify, ProductRecord, UnidentifiedPolicy};
pub use location::{
    resolve_location_once, CartClearer, FixedLocation, GeolocationError, GeolocationProvider,
    LocationStore,
};
pub use merge::{IdentityList, MergeReport, ProductLists};

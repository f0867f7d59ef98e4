//! `browse` subcommand: drives a [`ProductFeed`] to the end and prints both
//! lists.

use agrobridge_client::{
    CategoryClient, FeedSnapshot, LocationStore, ProductFeed, ProductRecord, SafeDefault,
    UnidentifiedPolicy,
};
use agrobridge_core::Coordinates;

#[derive(Debug)]
pub(crate) struct BrowseArgs {
    pub category: String,
    /// `(lng, lat)` given on the command line.
    pub location: Option<(f64, f64)>,
    pub api_url: Option<String>,
    pub synthesize_ids: bool,
}

pub(crate) async fn run(args: BrowseArgs) -> anyhow::Result<()> {
    let mut config = agrobridge_core::load_client_config()?;
    crate::init_tracing(&config.log_level)?;
    if let Some(url) = args.api_url {
        config.api_url = url;
    }

    let store = starting_location(config.fallback_location, args.location)?;

    let policy = if args.synthesize_ids {
        UnidentifiedPolicy::Synthesize
    } else {
        UnidentifiedPolicy::Reject
    };
    let client = CategoryClient::new(&config)?.with_unidentified_policy(policy);
    let feed = ProductFeed::new(
        SafeDefault(client),
        args.category,
        config.page_size,
        store.current(),
    );

    let pages = feed.fetch_to_end().await?;
    tracing::info!(category = feed.category(), pages, "browse finished");

    print_snapshot(feed.category(), &feed.snapshot());
    Ok(())
}

/// Location store seeded with `fallback`, replaced by command-line
/// coordinates when given.
pub(crate) fn starting_location(
    fallback: Coordinates,
    given: Option<(f64, f64)>,
) -> anyhow::Result<LocationStore> {
    let store = LocationStore::new(Some(fallback));
    if let Some((lng, lat)) = given {
        let position = Coordinates::try_new(lng, lat)?;
        store.set(position);
        tracing::debug!(location = %position, "using command-line location");
    }
    Ok(store)
}

fn print_snapshot(category: &str, snapshot: &FeedSnapshot<ProductRecord>) {
    let location = snapshot
        .location
        .map_or_else(|| "unknown".to_owned(), |l| l.to_string());
    println!("category '{category}' near {location}");

    print_list("deliverable", &snapshot.deliverable);
    print_list("not deliverable to this location", &snapshot.non_deliverable);

    if snapshot.rejected_records > 0 {
        println!(
            "{} record(s) skipped for lacking an id",
            snapshot.rejected_records
        );
    }
    if snapshot.shows_end_message() {
        println!("no more products");
    }
}

fn print_list(heading: &str, records: &[ProductRecord]) {
    println!("\n{heading} ({}):", records.len());
    if records.is_empty() {
        println!("  (none)");
    }
    for record in records {
        println!("  {record}");
    }
}

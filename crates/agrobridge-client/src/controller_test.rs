use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agrobridge_core::{CategoryPage, ProductId};
use tokio::sync::Semaphore;

use super::*;
use crate::client::{ParsedPage, SafeDefault};
use crate::identity::Identify;

#[derive(Debug, Clone, PartialEq)]
struct Item(ProductId);

impl Identify for Item {
    fn product_id(&self) -> &ProductId {
        &self.0
    }
}

#[derive(Clone)]
enum Step {
    Page {
        deliverable: Vec<&'static str>,
        non_deliverable: Vec<&'static str>,
        has_more: bool,
        rejected: usize,
    },
    Fail,
}

fn page(deliverable: &[&'static str], non_deliverable: &[&'static str], has_more: bool) -> Step {
    Step::Page {
        deliverable: deliverable.to_vec(),
        non_deliverable: non_deliverable.to_vec(),
        has_more,
        rejected: 0,
    }
}

/// Serves pages by page number and records every query it sees.
#[derive(Default)]
struct ScriptedSource {
    steps: HashMap<u32, Step>,
    queries: std::sync::Mutex<Vec<CategoryQuery>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSource {
    fn new(steps: impl IntoIterator<Item = (u32, Step)>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn queries(&self) -> Vec<CategoryQuery> {
        self.queries.lock().expect("queries lock").clone()
    }
}

impl CategorySource for ScriptedSource {
    type Record = Item;

    async fn fetch_page(&self, query: &CategoryQuery) -> Result<ParsedPage<Item>, ClientError> {
        self.queries.lock().expect("queries lock").push(query.clone());
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.expect("gate open");
        }

        let items = |ids: &[&str]| -> Vec<Item> { ids.iter().map(|id| Item(ProductId::new(*id))).collect() };
        match self.steps.get(&query.page) {
            Some(Step::Page {
                deliverable,
                non_deliverable,
                has_more,
                rejected,
            }) => Ok(ParsedPage {
                lists: CategoryPage {
                    deliverable_products: items(deliverable),
                    non_deliverable_products: items(non_deliverable),
                    has_more: *has_more,
                },
                rejected: *rejected,
            }),
            Some(Step::Fail) | None => Err(ClientError::UnexpectedStatus {
                status: 500,
                url: format!("scripted://page/{}", query.page),
            }),
        }
    }
}

const NAGPUR: Coordinates = Coordinates::new(79.088, 21.146);
const PUNE: Coordinates = Coordinates::new(73.856, 18.520);

fn feed(source: ScriptedSource) -> ProductFeed<ScriptedSource> {
    ProductFeed::new(source, "Fruits", 3, Some(NAGPUR))
}

fn names(items: &[Item]) -> Vec<&str> {
    items.iter().map(|i| i.0.as_str()).collect()
}

async fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn first_page_is_merged_and_page_advances() {
    let feed = feed(ScriptedSource::new([(1, page(&["a", "b", "c"], &["x", "y"], true))]));

    let outcome = feed.fetch_next().await;
    assert!(matches!(outcome, FetchOutcome::Applied(_)));

    let snap = feed.snapshot();
    assert_eq!(names(&snap.deliverable), vec!["a", "b", "c"]);
    assert_eq!(names(&snap.non_deliverable), vec!["x", "y"]);
    assert_eq!(snap.page, 2);
    assert!(!snap.is_reaching_end);

    let sent = feed.source().queries();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].category, "fruits");
    assert_eq!(sent[0].page, 1);
    assert_eq!(sent[0].page_size, 3);
    assert_eq!(sent[0].location, NAGPUR);
}

#[tokio::test]
async fn deliverable_item_stays_deliverable_when_relisted() {
    let feed = feed(ScriptedSource::new([
        (1, page(&["a", "b"], &[], true)),
        (2, page(&[], &["a", "x"], false)),
    ]));

    assert_eq!(feed.fetch_to_end().await.expect("pages load"), 2);

    let snap = feed.snapshot();
    assert_eq!(names(&snap.deliverable), vec!["a", "b"]);
    assert_eq!(names(&snap.non_deliverable), vec!["x"]);
}

#[tokio::test]
async fn final_page_stops_fetching() {
    let feed = feed(ScriptedSource::new([(1, page(&["a"], &[], false))]));

    feed.fetch_next().await;
    let again = feed.fetch_next().await;

    assert!(matches!(again, FetchOutcome::Skipped(SkipReason::ReachedEnd)));
    assert_eq!(feed.source().queries().len(), 1);
    assert!(feed.snapshot().shows_end_message());
}

#[tokio::test]
async fn reset_clears_lists_and_refetches_from_page_one() {
    let feed = feed(ScriptedSource::new([
        (1, page(&["a"], &["x"], true)),
        (2, page(&["b"], &[], false)),
    ]));
    feed.fetch_to_end().await.expect("pages load");

    feed.reset(Some(PUNE));
    let snap = feed.snapshot();
    assert!(snap.deliverable.is_empty());
    assert!(snap.non_deliverable.is_empty());
    assert_eq!(snap.page, 1);
    assert!(!snap.is_reaching_end);

    feed.fetch_next().await;
    let last = feed.source().queries().pop().expect("query sent");
    assert_eq!(last.page, 1);
    assert_eq!(last.location, PUNE);
}

#[tokio::test]
async fn concurrent_fetch_is_skipped_while_one_is_in_flight() {
    let gate = Arc::new(Semaphore::new(0));
    let feed = Arc::new(feed(
        ScriptedSource::new([(1, page(&["a"], &[], true))]).gated(Arc::clone(&gate)),
    ));

    let first = tokio::spawn({
        let feed = Arc::clone(&feed);
        async move { feed.fetch_next().await }
    });
    wait_for("first fetch to start", || feed.snapshot().is_fetching).await;

    let second = feed.fetch_next().await;
    assert!(matches!(second, FetchOutcome::Skipped(SkipReason::InFlight)));

    gate.add_permits(1);
    let first = first.await.expect("task joins");
    assert!(matches!(first, FetchOutcome::Applied(_)));
    assert_eq!(feed.source().queries().len(), 1);
    assert!(!feed.snapshot().is_fetching);
}

#[tokio::test]
async fn failed_fetch_releases_slot_and_keeps_page() {
    let feed = feed(ScriptedSource::new([(1, Step::Fail)]));

    let outcome = feed.fetch_next().await;
    assert!(matches!(
        outcome,
        FetchOutcome::Failed(ClientError::UnexpectedStatus { status: 500, .. })
    ));

    let snap = feed.snapshot();
    assert_eq!(snap.page, 1);
    assert!(!snap.is_fetching);
    assert!(!snap.is_reaching_end);
    assert!(feed.fetch_to_end().await.is_err());
}

#[tokio::test]
async fn dropping_a_fetch_releases_the_slot() {
    let gate = Arc::new(Semaphore::new(0));
    let feed = feed(ScriptedSource::new([(1, page(&["a"], &[], true))]).gated(gate));

    let timed_out = tokio::time::timeout(Duration::from_millis(20), feed.fetch_next()).await;
    assert!(timed_out.is_err());

    let snap = feed.snapshot();
    assert!(!snap.is_fetching);
    assert_eq!(snap.page, 1);
    assert!(snap.deliverable.is_empty());
}

#[tokio::test]
async fn response_for_previous_location_is_discarded() {
    let gate = Arc::new(Semaphore::new(0));
    let feed = Arc::new(feed(
        ScriptedSource::new([(1, page(&["old"], &[], true))]).gated(Arc::clone(&gate)),
    ));

    let pending = tokio::spawn({
        let feed = Arc::clone(&feed);
        async move { feed.fetch_next().await }
    });
    wait_for("fetch to start", || feed.snapshot().is_fetching).await;

    feed.reset(Some(PUNE));
    gate.add_permits(1);

    let outcome = pending.await.expect("task joins");
    assert!(matches!(outcome, FetchOutcome::Stale));
    let snap = feed.snapshot();
    assert!(snap.deliverable.is_empty());
    assert_eq!(snap.page, 1);
    assert!(!snap.is_fetching);
}

#[tokio::test]
async fn safe_default_turns_failure_into_final_empty_page() {
    let feed = ProductFeed::new(
        SafeDefault(ScriptedSource::new([(1, Step::Fail)])),
        "grains",
        10,
        Some(NAGPUR),
    );

    let outcome = feed.fetch_next().await;
    assert!(matches!(outcome, FetchOutcome::Applied(_)));

    let snap = feed.snapshot();
    assert!(snap.deliverable.is_empty());
    assert!(snap.is_reaching_end);
    assert_eq!(snap.page, 2);
}

#[tokio::test]
async fn rejected_records_are_counted() {
    let feed = feed(ScriptedSource::new([(
        1,
        Step::Page {
            deliverable: vec!["a"],
            non_deliverable: vec![],
            has_more: false,
            rejected: 2,
        },
    )]));

    feed.fetch_next().await;
    assert_eq!(feed.snapshot().rejected_records, 2);
}

#[tokio::test]
async fn missing_location_skips_without_querying() {
    let feed = ProductFeed::new(ScriptedSource::default(), "spices", 10, None);
    let outcome = feed.fetch_next().await;
    assert!(matches!(outcome, FetchOutcome::Skipped(SkipReason::NoLocation)));
    assert!(feed.source().queries().is_empty());
}

#[tokio::test]
async fn fetch_to_end_honours_page_cap() {
    let steps = (1..=10).map(|n| (n, page(&[], &[], true)));
    let feed = feed(ScriptedSource::new(steps)).with_max_pages(3);

    assert_eq!(feed.fetch_to_end().await.expect("pages load"), 3);
    assert_eq!(feed.snapshot().page, 4);
}

#[tokio::test]
async fn run_follows_location_changes() {
    let feed = Arc::new(feed(ScriptedSource::new([
        (1, page(&["a"], &["x"], true)),
        (2, page(&["b"], &[], false)),
    ])));
    let (tx, rx) = watch::channel(Some(NAGPUR));

    let driver = tokio::spawn({
        let feed = Arc::clone(&feed);
        async move { feed.run(rx).await }
    });

    wait_for("first location to load", || {
        let snap = feed.snapshot();
        snap.is_reaching_end && snap.deliverable.len() == 2
    })
    .await;

    tx.send_replace(Some(PUNE));
    wait_for("second location to load", || {
        let snap = feed.snapshot();
        snap.location == Some(PUNE) && snap.is_reaching_end
    })
    .await;

    let pune_queries: Vec<u32> = feed
        .source()
        .queries()
        .iter()
        .filter(|q| q.location == PUNE)
        .map(|q| q.page)
        .collect();
    assert_eq!(pune_queries, vec![1, 2]);

    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .expect("driver stops when the store is dropped")
        .expect("driver task joins");
}

#[tokio::test]
async fn location_change_during_run_cancels_the_fetch_in_flight() {
    let gate = Arc::new(Semaphore::new(0));
    let feed = Arc::new(feed(
        ScriptedSource::new([(1, page(&["a"], &["x"], false))]).gated(Arc::clone(&gate)),
    ));
    let (tx, rx) = watch::channel(Some(NAGPUR));

    let driver = tokio::spawn({
        let feed = Arc::clone(&feed);
        async move { feed.run(rx).await }
    });

    wait_for("first fetch to block", || feed.snapshot().is_fetching).await;
    tx.send_replace(Some(PUNE));

    // The cancelled fetch must free the slot, or the new location never queries.
    wait_for("fetch for the new location", || {
        feed.source().queries().iter().any(|q| q.location == PUNE)
    })
    .await;
    gate.add_permits(1);

    wait_for("new location to load", || feed.snapshot().is_reaching_end).await;

    let snap = feed.snapshot();
    assert_eq!(snap.location, Some(PUNE));
    assert_eq!(names(&snap.deliverable), vec!["a"]);
    assert_eq!(names(&snap.non_deliverable), vec!["x"]);
    assert_eq!(snap.page, 2);
    assert!(!snap.is_fetching);

    let seen: Vec<(Coordinates, u32)> = feed
        .source()
        .queries()
        .iter()
        .map(|q| (q.location, q.page))
        .collect();
    assert_eq!(seen, vec![(NAGPUR, 1), (PUNE, 1)]);

    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .expect("driver stops when the store is dropped")
        .expect("driver task joins");
}

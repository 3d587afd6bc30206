//! End-to-end sync runs against in-memory fakes.
//!
//! These drive [`SyncTask::run_at`] with a fixed clock, a scripted source API
//! and an in-memory hub, and check what ends up published.

mod common;

use std::sync::Arc;
use std::time::Duration;

use harvester::http::HttpMethod;
use harvester::source::{Moves, SourceKind, SourceRegistry};
use harvester::sync::StopReason;
use harvester::task::{RunOutcome, SyncJob, SyncTask, TaskError};
use serde_json::{Value, json};

use common::*;

const API: &str = "http://moves.test";
const BASENAME: &str = "moves-storyline-data.json";

fn week_url(year: i32, week: u32) -> String {
    format!("{API}/user/storyline/daily/{year}-W{week}?trackPoints=true&access_token={SOURCE_TOKEN}")
}

fn profile_url() -> String {
    format!("{API}/user/profile?access_token={SOURCE_TOKEN}")
}

fn days(dates: &[&str]) -> Value {
    Value::Array(dates.iter().map(|d| json!({"date": d, "summary": []})).collect())
}

fn dates(value: &Value) -> Vec<String> {
    value
        .as_array()
        .expect("record list")
        .iter()
        .map(|r| r["date"].as_str().unwrap_or_default().to_string())
        .collect()
}

struct World {
    transport: MockTransport,
    hub: Arc<MemoryArtifactStore>,
    bookkeeping: Arc<RecordingBookkeeping>,
    task: SyncTask,
}

fn world() -> World {
    let transport = MockTransport::new();
    let hub = Arc::new(MemoryArtifactStore::new());
    let bookkeeping = Arc::new(RecordingBookkeeping::default());
    let task = SyncTask::builder()
        .credentials(Arc::new(StaticCredentials))
        .artifacts(hub.clone())
        .fetcher(fetcher(&transport))
        .sources(SourceRegistry::new().with(Arc::new(Moves::with_api_base(API))))
        .bookkeeping(bookkeeping.clone())
        .build()
        .unwrap();

    World {
        transport,
        hub,
        bookkeeping,
        task,
    }
}

impl World {
    /// Answer the next GET of `url` with `body`.
    fn serve(&self, url: String, body: Value) {
        self.transport.push_json(HttpMethod::Get, url, body);
    }
}

fn job() -> SyncJob {
    SyncJob::new(MEMBER, SourceKind::Moves)
}

fn seed(world: &World, body: &Value) {
    world
        .hub
        .put(MEMBER, BASENAME, &["GPS", "Moves", "steps"], body.to_string().as_bytes());
}

#[tokio::test]
async fn resumes_from_trailing_week_through_current_week() {
    let world = world();
    seed(&world, &days(&["20160601", "20160608"]));
    world.serve(week_url(2016, 23), days(&["20160606", "20160608"]));
    world.serve(week_url(2016, 24), days(&["20160613"]));
    world.serve(week_url(2016, 25), days(&["20160620", "20160624"]));

    let now = at(2016, 6, 24);
    let outcome = world.task.run_at(&job(), now).await.unwrap();

    let RunOutcome::Done(summary) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.report.evicted, 1);
    assert_eq!(summary.report.pages_fetched, 3);
    assert_eq!(summary.report.stop, StopReason::CaughtUp);
    assert_eq!(
        world.transport.urls(),
        vec![week_url(2016, 23), week_url(2016, 24), week_url(2016, 25)]
    );

    let published = world.hub.json(MEMBER, BASENAME).unwrap();
    assert_eq!(
        dates(&published),
        vec!["20160601", "20160606", "20160608", "20160613", "20160620", "20160624"]
    );
    let file = world.hub.file(MEMBER, BASENAME).unwrap();
    let metadata = file.metadata.unwrap();
    assert_eq!(metadata.updated_at, now);
    assert_eq!(metadata.tags, vec!["GPS", "Moves", "steps"]);
    assert_eq!(world.bookkeeping.synced.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_sync_without_new_data_is_byte_identical() {
    let world = world();
    seed(&world, &days(&["20160601", "20160608"]));
    world.serve(week_url(2016, 23), days(&["20160606", "20160608"]));
    world.serve(week_url(2016, 24), days(&["20160613"]));
    world.serve(week_url(2016, 25), days(&["20160620"]));
    // The second run resumes from week 25 only.
    world.serve(week_url(2016, 25), days(&["20160620"]));

    world.task.run_at(&job(), at(2016, 6, 24)).await.unwrap();
    let first = world.hub.file(MEMBER, BASENAME).unwrap().body;

    world.task.run_at(&job(), at(2016, 6, 24)).await.unwrap();
    let second = world.hub.file(MEMBER, BASENAME).unwrap().body;

    assert_eq!(first, second);
    assert_eq!(world.transport.unused(), 0);
}

#[tokio::test]
async fn rate_limit_mid_run_publishes_history_and_fetched_pages() {
    let world = world();
    seed(&world, &days(&["20160601", "20160608"]));
    world.serve(week_url(2016, 23), days(&["20160606", "20160608"]));
    world.serve(week_url(2016, 24), days(&["20160613"]));
    world
        .transport
        .push_status(HttpMethod::Get, week_url(2016, 25), 429, "");

    let outcome = world.task.run_at(&job(), at(2016, 6, 24)).await.unwrap();

    match outcome {
        RunOutcome::RetryAfter { delay, summary } => {
            assert_eq!(delay, Duration::from_secs(61));
            assert_eq!(summary.report.pages_fetched, 2);
        }
        other => panic!("expected a deferred run, got {other:?}"),
    }
    let published = world.hub.json(MEMBER, BASENAME).unwrap();
    assert_eq!(
        dates(&published),
        vec!["20160601", "20160606", "20160608", "20160613"]
    );
    assert!(world.bookkeeping.synced.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_dataset_looks_up_first_date_once() {
    let world = world();
    world.serve(profile_url(), json!({"profile": {"firstDate": "20160615"}}));
    world.serve(week_url(2016, 24), days(&["20160615"]));
    world.serve(week_url(2016, 25), days(&["20160620"]));

    let outcome = world.task.run_at(&job(), at(2016, 6, 24)).await.unwrap();
    assert!(!outcome.summary().found_existing);

    let urls = world.transport.urls();
    assert_eq!(urls[0], profile_url());
    assert_eq!(urls.iter().filter(|u| **u == profile_url()).count(), 1);
    assert_eq!(
        dates(&world.hub.json(MEMBER, BASENAME).unwrap()),
        vec!["20160615", "20160620"]
    );
}

#[tokio::test]
async fn unreadable_artifact_is_never_overwritten() {
    let world = world();
    world
        .hub
        .put(MEMBER, BASENAME, &["Moves"], b"{\"not\": \"a list\"}");

    let err = world
        .task
        .run_at(&job(), at(2016, 6, 24))
        .await
        .expect_err("shape mismatch should fail the run");

    assert!(matches!(err, TaskError::Parse(_)));
    assert_eq!(world.hub.uploads(), 0);
    assert!(world.transport.requests().is_empty());
    assert_eq!(
        world.hub.file(MEMBER, BASENAME).unwrap().body,
        b"{\"not\": \"a list\"}".to_vec()
    );
}

#[tokio::test]
async fn malformed_page_counts_as_empty() {
    let world = world();
    seed(&world, &days(&["20160620"]));
    world
        .transport
        .push_status(HttpMethod::Get, week_url(2016, 25), 200, "<html>oops</html>");

    let outcome = world.task.run_at(&job(), at(2016, 6, 24)).await.unwrap();
    assert!(outcome.summary().report.stop.is_caught_up());
    assert_eq!(outcome.summary().report.empty_pages, 1);
    // The evicted week stays evicted until a later run refetches it.
    assert_eq!(dates(&world.hub.json(MEMBER, BASENAME).unwrap()), Vec::<String>::new());
    assert_eq!(world.transport.unused(), 0);
}

//! End-to-end sync tests against a mock stream service and a real SQLite store
//!
//! Every test starts a wiremock server that serves a paginated stream, syncs it with
//! the bundled [`HttpStreamService`](feedsync::HttpStreamService) into a temporary
//! [`Database`](feedsync::Database), and checks both the outcome and what landed on disk.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --test sync_pipeline
//! ```

mod common;

use chrono::{TimeZone, Utc};
use common::{
    CONTENTS_PATH, TEST_FEEDS, TEST_USER, assert_article_count, collect_events_until_terminal,
    continuation_for, create_mock_session, entry, mount_failing_stream, mount_stream,
    orphan_entry, page_body, wait_for_outcome,
};
use feedsync::{Error, ErrorKind, ResourceId, SessionState, SyncEvent, SyncOutcome, TransportError};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(10);

fn resource() -> ResourceId {
    ResourceId::global_all(TEST_USER)
}

// ============================================================================
// Successful syncs
// ============================================================================

#[tokio::test]
async fn test_full_sync_ingests_every_page() {
    let server = MockServer::start().await;
    let total = mount_stream(&server, resource().as_str(), &[20, 20, 7]).await;
    assert_eq!(total, 47);

    let (session, db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();
    let outcome = wait_for_outcome(session.start(resource(), None), TIMEOUT).await;

    let report = outcome.report().expect("sync should finish").clone();
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.chains, 3);
    assert_eq!(report.items_fetched, 47);
    assert_eq!(report.articles_created, 47);
    assert_eq!(report.articles_updated, 0);

    assert_article_count(&db, 47).await;
    assert_eq!(db.feed_count().await.unwrap(), TEST_FEEDS.len() as i64);
    // Every fifth entry arrives read
    assert_eq!(db.unread_count().await.unwrap(), 37);
}

#[tokio::test]
async fn test_article_fields_and_status_are_stored() {
    let server = MockServer::start().await;
    mount_stream(&server, resource().as_str(), &[8]).await;

    let (session, db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();
    let outcome = wait_for_outcome(session.start(resource(), None), TIMEOUT).await;
    assert!(outcome.is_success(), "unexpected outcome: {outcome:?}");

    let article = db.get_article("entry-0007").await.unwrap().expect("stored");
    assert_eq!(article.feed_id, TEST_FEEDS[7 % 3]);
    assert_eq!(article.title.as_deref(), Some("Entry 7"));
    assert_eq!(article.url.as_deref(), Some("https://example.com/posts/7"));
    assert_eq!(article.author.as_deref(), Some("Test Author"));
    assert_eq!(
        article.content_html.as_deref(),
        Some("<p>Body of entry 7</p>")
    );
    assert_eq!(
        article.published(),
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 7, 0).unwrap())
    );

    let starred = db.get_status("entry-0007").await.unwrap().expect("status");
    assert!(!starred.read);
    assert!(starred.starred);

    let read = db.get_status("entry-0005").await.unwrap().expect("status");
    assert!(read.read);
    assert!(!read.starred);

    let feed = db.get_feed(TEST_FEEDS[1]).await.unwrap().expect("feed");
    assert_eq!(feed.title.as_deref(), Some("Feed 1"));
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let server = MockServer::start().await;
    mount_stream(&server, resource().as_str(), &[10, 10, 5]).await;

    let (session, db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();

    let first = wait_for_outcome(session.start(resource(), None), TIMEOUT).await;
    let first = first.report().expect("first sync").clone();
    assert_eq!(first.articles_created, 25);
    let before = db.articles_for_feed(TEST_FEEDS[0]).await.unwrap();

    let second = wait_for_outcome(session.start(resource(), None), TIMEOUT).await;
    let second = second.report().expect("second sync").clone();
    assert_eq!(second.articles_created, 0);
    assert_eq!(second.articles_updated, 25);

    assert_article_count(&db, 25).await;
    let after = db.articles_for_feed(TEST_FEEDS[0]).await.unwrap();
    let ids = |rows: &[feedsync::db::ArticleRow]| {
        rows.iter().map(|row| row.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn test_empty_stream_finishes_without_articles() {
    let server = MockServer::start().await;
    mount_stream(&server, resource().as_str(), &[0]).await;

    let (session, db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();
    let outcome = wait_for_outcome(session.start(resource(), None), TIMEOUT).await;

    let report = outcome.report().expect("sync should finish");
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.items_fetched, 0);
    assert_article_count(&db, 0).await;
}

#[tokio::test]
async fn test_items_without_feed_are_skipped() {
    let server = MockServer::start().await;
    let entries = vec![entry(1), orphan_entry(1), entry(2), orphan_entry(2)];
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page_body(resource().as_str(), entries, None)),
        )
        .mount(&server)
        .await;

    let (session, db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();
    let mut events = session.subscribe();
    let handle = session.start(resource(), None);
    let collected = collect_events_until_terminal(&mut events, TIMEOUT).await;
    assert!(wait_for_outcome(handle, TIMEOUT).await.is_success());

    let grouped = collected
        .iter()
        .find_map(|event| match event {
            SyncEvent::ItemsGrouped { items, skipped, .. } => Some((*items, *skipped)),
            _ => None,
        })
        .expect("grouping event");
    assert_eq!(grouped, (2, 2));
    assert_article_count(&db, 2).await;
    assert!(db.get_article("orphan-0001").await.unwrap().is_none());
}

#[tokio::test]
async fn test_newer_than_is_sent_with_every_page() {
    let server = MockServer::start().await;
    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let millis = since.timestamp_millis().to_string();

    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(query_param("newerThan", millis.as_str()))
        .and(query_param_is_missing("continuation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(
            resource().as_str(),
            vec![entry(1)],
            Some("next"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(query_param("newerThan", millis.as_str()))
        .and(query_param("continuation", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(
            resource().as_str(),
            vec![entry(2)],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (session, db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();
    let outcome = wait_for_outcome(session.start(resource(), Some(since)), TIMEOUT).await;

    assert!(outcome.is_success(), "unexpected outcome: {outcome:?}");
    assert_article_count(&db, 2).await;
}

#[tokio::test]
async fn test_events_follow_the_pipeline() {
    let server = MockServer::start().await;
    mount_stream(&server, resource().as_str(), &[5, 5, 5]).await;

    let (session, _db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();
    let mut events = session.subscribe();
    let handle = session.start(resource(), None);
    let collected = collect_events_until_terminal(&mut events, TIMEOUT).await;
    wait_for_outcome(handle, TIMEOUT).await;

    assert!(matches!(collected.first(), Some(SyncEvent::Started { .. })));
    assert!(matches!(collected.last(), Some(SyncEvent::Completed { .. })));

    let fetched: Vec<usize> = collected
        .iter()
        .filter_map(|event| match event {
            SyncEvent::PageFetched { page, .. } => Some(*page),
            _ => None,
        })
        .collect();
    assert_eq!(fetched, vec![0, 1, 2]);

    let merged = collected
        .iter()
        .filter(|event| matches!(event, SyncEvent::ItemsMerged { .. }))
        .count();
    assert_eq!(merged, 3);

    let end = collected
        .iter()
        .position(|event| matches!(event, SyncEvent::EndOfStream { pages: 3 }))
        .expect("end of stream event");
    assert!(end < collected.len() - 1);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_unauthorized_fails_without_articles() {
    let server = MockServer::start().await;
    mount_failing_stream(&server, 401).await;

    let (session, db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();
    let handle = session.start(resource(), None);
    let canceler = handle.canceler();
    let outcome = wait_for_outcome(handle, TIMEOUT).await;

    let error = outcome.error().expect("sync should fail");
    assert!(
        matches!(error, Error::Transport(TransportError::Unauthorized(_))),
        "unexpected error: {error:?}"
    );
    assert_eq!(error.kind(), ErrorKind::Transport);
    assert_eq!(outcome.state(), SessionState::Failed);
    assert!(!canceler.is_canceled());
    assert_article_count(&db, 0).await;
}

#[tokio::test]
async fn test_failed_page_stops_pagination() {
    let server = MockServer::start().await;
    let stream_id = resource();

    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(query_param_is_missing("continuation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(
            stream_id.as_str(),
            (0..10).map(entry).collect(),
            Some(continuation_for(0).as_str()),
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(query_param("continuation", continuation_for(0)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(query_param("continuation", continuation_for(1)))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(
            stream_id.as_str(),
            Vec::new(),
            None,
        )))
        .expect(0)
        .mount(&server)
        .await;

    let (session, db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();
    let outcome = wait_for_outcome(session.start(stream_id, None), TIMEOUT).await;

    let error = outcome.error().expect("sync should fail");
    assert!(
        matches!(error, Error::Transport(TransportError::Http { status: 500, .. })),
        "unexpected error: {error:?}"
    );
    // The first page may or may not have been merged before the failure; nothing else can be
    let stored = db.article_count().await.unwrap();
    assert!(stored == 0 || stored == 10, "partial page merged: {stored}");
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_while_fetching_next_page() {
    let server = MockServer::start().await;
    let stream_id = resource();

    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(query_param_is_missing("continuation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(
            stream_id.as_str(),
            (0..5).map(entry).collect(),
            Some(continuation_for(0).as_str()),
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(query_param("continuation", continuation_for(0)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(stream_id.as_str(), Vec::new(), None))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let (session, _db, _temp_dir) = create_mock_session(&server.uri()).await.unwrap();
    let mut events = session.subscribe();
    let handle = session.start(stream_id, None);

    // Wait until the second page has been requested
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if let Ok(SyncEvent::PageRequested { page: 1, .. }) = events.recv().await {
                return;
            }
        }
    })
    .await
    .expect("second page requested");

    handle.cancel();
    handle.cancel();
    let started = std::time::Instant::now();
    let outcome = wait_for_outcome(handle, TIMEOUT).await;

    assert!(matches!(outcome, SyncOutcome::Canceled), "unexpected outcome: {outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(3));

    let rest = collect_events_until_terminal(&mut events, TIMEOUT).await;
    assert!(
        !rest
            .iter()
            .any(|event| matches!(event, SyncEvent::PageFetched { page: 1, .. })),
        "canceled page reported: {rest:?}"
    );
    assert!(matches!(rest.last(), Some(SyncEvent::Canceled { .. })));
}

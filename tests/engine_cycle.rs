// tests/engine_cycle.rs
// One poll cycle end to end against scripted collaborators and a pinned clock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use social_sentiment_watcher::classify::{
    Classification, Classifier, ScriptedClassifier, Sentiment,
};
use social_sentiment_watcher::clock::ManualClock;
use social_sentiment_watcher::engine::{AllowedHours, CycleOutcome, PollEngine};
use social_sentiment_watcher::feed::{FeedSource, FetchError, Post, ScriptedFeed};
use social_sentiment_watcher::notify::{NotificationSink, RecordingSink};
use social_sentiment_watcher::WatermarkStore;

/// 11:00 in New York on a June day: inside the default 7..24 window.
fn daytime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 15, 0, 0).unwrap()
}

/// 03:30 in New York: outside the window.
fn nighttime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 7, 30, 0).unwrap()
}

fn post(id: &str, created_at: DateTime<Utc>) -> Post {
    Post {
        id: id.to_string(),
        created_at,
        content: format!("<p>post {id}</p>"),
        url: format!("https://example.social/@acct/{id}"),
        account: social_sentiment_watcher::feed::Account {
            username: "acct".into(),
        },
    }
}

fn positive() -> Classification {
    Classification {
        relevant: true,
        sentiment: Sentiment::Positive,
    }
}

fn neutral() -> Classification {
    Classification {
        relevant: false,
        sentiment: Sentiment::Neutral,
    }
}

struct Harness {
    engine: PollEngine,
    feed: Arc<ScriptedFeed>,
    classifier: Arc<ScriptedClassifier>,
    sink: Arc<RecordingSink>,
    store: Arc<WatermarkStore>,
    clock: Arc<ManualClock>,
    _dir: TempDir,
}

fn harness(
    batches: Vec<Result<Vec<Post>, FetchError>>,
    classifier: ScriptedClassifier,
    sink: RecordingSink,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(WatermarkStore::open(dir.path().join("wm.txt")).unwrap());
    let feed = Arc::new(ScriptedFeed::new(batches));
    let classifier = Arc::new(classifier);
    let sink = Arc::new(sink);
    let clock = Arc::new(ManualClock::new(daytime()));
    let engine = PollEngine::new(
        feed.clone() as Arc<dyn FeedSource>,
        classifier.clone() as Arc<dyn Classifier>,
        sink.clone() as Arc<dyn NotificationSink>,
        store.clone(),
        clock.clone(),
        AllowedHours {
            tz: chrono_tz::America::New_York,
            start_hour: 7,
            end_hour: 24,
        },
    );
    Harness {
        engine,
        feed,
        classifier,
        sink,
        store,
        clock,
        _dir: dir,
    }
}

#[tokio::test]
async fn batch_max_is_independent_of_fetch_order() {
    let t = daytime();
    // Returned in arbitrary order: [T-3m, T, T-1m, T-2m].
    let batch = vec![
        post("a", t - Duration::minutes(3)),
        post("d", t),
        post("c", t - Duration::minutes(1)),
        post("b", t - Duration::minutes(2)),
    ];
    let h = harness(
        vec![Ok(batch)],
        ScriptedClassifier::new(HashMap::new()),
        RecordingSink::new(),
    );

    let outcome = h.engine.run_cycle().await;
    let CycleOutcome::Completed(report) = outcome else {
        panic!("expected completed cycle");
    };
    assert_eq!(report.processed, 4);
    assert_eq!(report.watermark, Some(t));
    assert_eq!(h.store.last_seen(), Some(t));

    // And the advance was persisted durably.
    let reopened = WatermarkStore::open(h.store.path()).unwrap();
    assert_eq!(reopened.last_seen(), Some(t));
}

#[tokio::test]
async fn post_exactly_at_watermark_is_never_reprocessed() {
    let w = daytime() - Duration::minutes(10);
    let batch = vec![post("old", w), post("new", w + Duration::minutes(1))];
    let h = harness(
        vec![Ok(batch)],
        ScriptedClassifier::new(HashMap::new()),
        RecordingSink::new(),
    );
    h.store.advance(w);

    let CycleOutcome::Completed(report) = h.engine.run_cycle().await else {
        panic!("expected completed cycle");
    };
    assert_eq!(report.processed, 1);
    assert_eq!(h.classifier.seen_ids(), vec!["new".to_string()]);
    assert_eq!(h.store.last_seen(), Some(w + Duration::minutes(1)));
}

#[tokio::test]
async fn second_cycle_over_same_page_is_idempotent() {
    let t = daytime();
    let batch = vec![
        post("p1", t - Duration::minutes(2)),
        post("p2", t - Duration::minutes(1)),
    ];
    let h = harness(
        vec![Ok(batch.clone()), Ok(batch)],
        ScriptedClassifier::new(HashMap::from([("p2".to_string(), positive())])),
        RecordingSink::new(),
    );

    let CycleOutcome::Completed(first) = h.engine.run_cycle().await else {
        panic!("expected completed cycle");
    };
    assert_eq!(first.processed, 2);
    assert_eq!(first.notified, 1);

    let CycleOutcome::Completed(second) = h.engine.run_cycle().await else {
        panic!("expected completed cycle");
    };
    assert_eq!(second.processed, 0);
    assert_eq!(second.notified, 0);
    assert_eq!(second.watermark, first.watermark);

    // Classified and notified at most once per post.
    assert_eq!(h.classifier.seen_ids().len(), 2);
    assert_eq!(h.sink.delivered_ids(), vec!["p2".to_string()]);
}

#[tokio::test]
async fn classifier_failure_still_advances_watermark_and_skips_notify() {
    let t = daytime();
    // The poison post is also the newest one.
    let batch = vec![
        post("ok", t - Duration::minutes(1)),
        post("poison", t),
    ];
    let h = harness(
        vec![Ok(batch)],
        ScriptedClassifier::new(HashMap::from([("ok".to_string(), positive())]))
            .failing_for(&["poison"]),
        RecordingSink::new(),
    );

    let CycleOutcome::Completed(report) = h.engine.run_cycle().await else {
        panic!("expected completed cycle");
    };
    assert_eq!(report.processed, 2);
    assert_eq!(report.notified, 1);
    assert_eq!(h.store.last_seen(), Some(t));
    assert_eq!(h.sink.delivered_ids(), vec!["ok".to_string()]);
}

#[tokio::test]
async fn fetch_failure_aborts_cycle_without_touching_watermark() {
    let w = daytime() - Duration::minutes(5);
    let h = harness(
        vec![Err(FetchError::BadStatus(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
        ))],
        ScriptedClassifier::new(HashMap::new()),
        RecordingSink::new(),
    );
    h.store.advance(w);

    assert_eq!(h.engine.run_cycle().await, CycleOutcome::FetchFailed);
    assert_eq!(h.store.last_seen(), Some(w));
    assert!(h.classifier.seen_ids().is_empty());
}

#[tokio::test]
async fn outside_allowed_hours_means_zero_fetches_and_zero_state_changes() {
    let h = harness(
        vec![Ok(vec![post("x", daytime())])],
        ScriptedClassifier::new(HashMap::new()),
        RecordingSink::new(),
    );
    h.clock.set(nighttime());

    assert_eq!(h.engine.run_cycle().await, CycleOutcome::OutsideWindow);
    assert_eq!(h.feed.fetch_calls(), 0);
    assert_eq!(h.store.last_seen(), None);
    assert!(!h.store.path().exists());
}

#[tokio::test]
async fn empty_page_is_a_noop_cycle_with_no_state_file() {
    let h = harness(
        vec![Ok(vec![])],
        ScriptedClassifier::new(HashMap::new()),
        RecordingSink::new(),
    );

    let CycleOutcome::Completed(report) = h.engine.run_cycle().await else {
        panic!("expected completed cycle");
    };
    assert_eq!(report.processed, 0);
    assert_eq!(report.watermark, None);
    assert!(!h.store.path().exists());
}

#[tokio::test]
async fn notify_failure_is_logged_only_and_watermark_still_advances() {
    let t = daytime();
    let h = harness(
        vec![Ok(vec![post("p", t)])],
        ScriptedClassifier::new(HashMap::from([("p".to_string(), positive())])),
        RecordingSink::failing(),
    );

    let CycleOutcome::Completed(report) = h.engine.run_cycle().await else {
        panic!("expected completed cycle");
    };
    assert_eq!(report.processed, 1);
    assert_eq!(report.notified, 0);
    assert_eq!(h.store.last_seen(), Some(t));
    // Delivery was attempted exactly once.
    assert_eq!(h.sink.delivered_ids(), vec!["p".to_string()]);
}

#[tokio::test]
async fn irrelevant_or_negative_posts_are_not_notified() {
    let t = daytime();
    let h = harness(
        vec![Ok(vec![
            post("neutral", t - Duration::minutes(2)),
            post("negative", t - Duration::minutes(1)),
        ])],
        ScriptedClassifier::new(HashMap::from([
            ("neutral".to_string(), neutral()),
            (
                "negative".to_string(),
                Classification {
                    relevant: true,
                    sentiment: Sentiment::Negative,
                },
            ),
        ])),
        RecordingSink::new(),
    );

    let CycleOutcome::Completed(report) = h.engine.run_cycle().await else {
        panic!("expected completed cycle");
    };
    assert_eq!(report.processed, 2);
    assert_eq!(report.notified, 0);
    assert!(h.sink.delivered_ids().is_empty());

    // The watermark still advanced past both posts.
    assert_eq!(h.store.last_seen(), Some(t - Duration::minutes(1)));
}

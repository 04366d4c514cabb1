// src/engine.rs
//! Poll cycle engine: one cycle = gate on allowed hours, fetch, filter by
//! watermark, classify, notify, advance + persist the watermark.
//!
//! Failure policy per step:
//! - fetch failure aborts the cycle, watermark untouched, retried next tick;
//! - classify failure is per-post: the post still counts as processed and
//!   its timestamp still feeds the new watermark, so a poison post can never
//!   stall the watermark and cause infinite reprocessing;
//! - notify failure is per-post and logged only;
//! - persist failure is logged; the in-memory watermark stays advanced and
//!   the next advance retries the write.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::classify::{Classifier, Sentiment};
use crate::clock::Clock;
use crate::feed::FeedSource;
use crate::notify::NotificationSink;
use crate::tracker::WatermarkStore;

/// Daily window in which polling is permitted, `[start_hour, end_hour)` in
/// local hours of `tz`.
#[derive(Clone, Copy, Debug)]
pub struct AllowedHours {
    pub tz: Tz,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl AllowedHours {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let hour = now.with_timezone(&self.tz).hour();
        self.start_hour <= hour && hour < self.end_hour
    }
}

/// Outcome of one cycle; observability only, never persisted.
#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Outside the allowed-hours window; zero fetches, zero state changes.
    OutsideWindow,
    /// Feed fetch failed; watermark untouched, error already logged.
    FetchFailed,
    Completed(CycleReport),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub processed: usize,
    pub notified: usize,
    pub watermark: Option<DateTime<Utc>>,
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("watcher_cycles_total", "Poll cycles executed.");
        describe_counter!("watcher_posts_processed_total", "New posts processed.");
        describe_counter!("watcher_notifications_total", "Notifications delivered.");
        describe_counter!("watcher_fetch_errors_total", "Feed fetch failures.");
        describe_counter!("watcher_classify_errors_total", "Classifier failures.");
        describe_counter!("watcher_notify_errors_total", "Notification failures.");
        describe_counter!("watcher_persist_errors_total", "Watermark persist failures.");
        describe_gauge!("watcher_last_cycle_ts", "Unix ts of the last completed cycle.");
        describe_gauge!("watcher_watermark_ts", "Unix ts of the current watermark.");
    });
}

pub struct PollEngine {
    feed: Arc<dyn FeedSource>,
    classifier: Arc<dyn Classifier>,
    sink: Arc<dyn NotificationSink>,
    tracker: Arc<WatermarkStore>,
    clock: Arc<dyn Clock>,
    hours: AllowedHours,
}

impl PollEngine {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        classifier: Arc<dyn Classifier>,
        sink: Arc<dyn NotificationSink>,
        tracker: Arc<WatermarkStore>,
        clock: Arc<dyn Clock>,
        hours: AllowedHours,
    ) -> Self {
        Self {
            feed,
            classifier,
            sink,
            tracker,
            clock,
            hours,
        }
    }

    /// Current watermark, for observability and CLI reporting.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.tracker.last_seen()
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        ensure_metrics_described();

        let now = self.clock.now();
        if !self.hours.contains(now) {
            tracing::debug!(
                tz = %self.hours.tz,
                "outside allowed polling hours, skipping cycle"
            );
            return CycleOutcome::OutsideWindow;
        }

        let last_seen = self.tracker.last_seen();
        tracing::debug!(watermark = ?last_seen.map(|t| t.to_rfc3339()), "running poll cycle");

        let posts = match self.feed.fetch().await {
            Ok(posts) => posts,
            Err(e) => {
                tracing::warn!(error = %e, source = self.feed.name(), "feed fetch failed");
                counter!("watcher_fetch_errors_total").increment(1);
                return CycleOutcome::FetchFailed;
            }
        };

        let mut report = CycleReport::default();
        // Batch maximum is tracked independently of fetch order.
        let mut max_seen = last_seen;
        let mut saw_new = false;

        for post in &posts {
            // Strict "after": a post exactly at the watermark is already seen.
            if let Some(w) = last_seen {
                if post.created_at <= w {
                    continue;
                }
            }
            saw_new = true;
            if max_seen.is_none_or(|m| post.created_at > m) {
                max_seen = Some(post.created_at);
            }

            let verdict = match self.classifier.classify(post).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, post_id = %post.id, "classification failed");
                    counter!("watcher_classify_errors_total").increment(1);
                    // Still processed: the timestamp already fed max_seen above.
                    report.processed += 1;
                    continue;
                }
            };
            report.processed += 1;

            if verdict.relevant && verdict.sentiment == Sentiment::Positive {
                tracing::info!(post_id = %post.id, "relevant positive post, notifying");
                match self.sink.notify(post, &verdict).await {
                    Ok(()) => {
                        report.notified += 1;
                        counter!("watcher_notifications_total").increment(1);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, post_id = %post.id, sink = self.sink.name(), "notification failed");
                        counter!("watcher_notify_errors_total").increment(1);
                    }
                }
            }
        }

        if saw_new {
            if let Some(ts) = max_seen {
                self.tracker.advance(ts);
                if let Err(e) = self.tracker.persist() {
                    // In-memory value stays ahead of durable state; surfaced,
                    // retried on the next advance.
                    tracing::error!(error = %e, "persisting watermark failed");
                    counter!("watcher_persist_errors_total").increment(1);
                }
                gauge!("watcher_watermark_ts").set(ts.timestamp() as f64);
            }
        }

        counter!("watcher_cycles_total").increment(1);
        counter!("watcher_posts_processed_total").increment(report.processed as u64);
        gauge!("watcher_last_cycle_ts").set(now.timestamp() as f64);

        report.watermark = self.tracker.last_seen();
        tracing::info!(
            fetched = posts.len(),
            processed = report.processed,
            notified = report.notified,
            watermark = ?report.watermark.map(|t| t.to_rfc3339()),
            "poll cycle finished"
        );
        CycleOutcome::Completed(report)
    }
}

// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod classify;
pub mod clock;
pub mod config;
pub mod engine;
pub mod feed;
pub mod notify;
pub mod scheduler;
pub mod tracker;

// ---- Re-exports for stable public API ----
pub use crate::classify::{Classification, Classifier, Sentiment};
pub use crate::clock::{Clock, SystemClock};
pub use crate::config::Config;
pub use crate::engine::{AllowedHours, CycleOutcome, CycleReport, PollEngine};
pub use crate::feed::{FeedSource, FetchError, Post};
pub use crate::notify::{NotificationSink, NotifyError};
pub use crate::scheduler::Scheduler;
pub use crate::tracker::{WatermarkError, WatermarkStore};

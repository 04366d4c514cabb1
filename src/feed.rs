// src/feed.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// A single public post as returned by the feed endpoint.
/// Unknown payload fields are ignored on decode; `content` may carry HTML.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub account: Account,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Account {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed returned status {0}")]
    BadStatus(reqwest::StatusCode),
    #[error("decoding feed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Feed collaborator: returns the current page of posts, newest-first by
/// convention, but callers must not rely on any ordering.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Post>, FetchError>;
    fn name(&self) -> &'static str;
}

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// HTTP implementation hitting the account's statuses endpoint.
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    /// `url` is the fully resolved statuses endpoint (account already substituted).
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { client, url }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<Vec<Post>, FetchError> {
        tracing::debug!(url = %self.url, "fetching feed page");
        let resp = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status));
        }

        // Decode from the raw body so payload errors are distinguishable
        // from transport errors.
        let body = resp.text().await?;
        let posts: Vec<Post> = serde_json::from_str(&body)?;
        tracing::debug!(count = posts.len(), "fetched feed page");
        Ok(posts)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// --- Test helper ---

/// Scripted feed for tests: pops one pre-queued batch per fetch and counts
/// calls. An exhausted script yields empty pages.
pub struct ScriptedFeed {
    batches: Mutex<VecDeque<Result<Vec<Post>, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(batches: Vec<Result<Vec<Post>, FetchError>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fetch_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch(&self) -> Result<Vec<Post>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .expect("scripted feed lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

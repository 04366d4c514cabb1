// src/notify/mod.rs
pub mod ntfy;

use async_trait::async_trait;
use chrono::SecondsFormat;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::classify::{Classification, Sentiment};
use crate::config::Config;
use crate::feed::Post;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Transport(String),
    #[error("notification endpoint returned {0}")]
    BadStatus(reqwest::StatusCode),
}

/// Notification collaborator: performs the side effect for a relevant,
/// positively classified post. Failures are per-post and never roll back
/// watermark accounting.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, post: &Post, verdict: &Classification) -> Result<(), NotifyError>;
    fn name(&self) -> &'static str;
}

/// Title and body shared by all sinks.
pub fn format_message(post: &Post, verdict: &Classification) -> (String, String) {
    let snippet: String = {
        let content = crate::classify::normalize_content(&post.content);
        let truncated: String = content.chars().take(200).collect();
        if content.chars().count() > 200 {
            format!("{truncated}...")
        } else {
            truncated
        }
    };
    let title = format!(
        "Market-relevant {} post from @{}",
        verdict.sentiment, post.account.username
    );
    let body = format!(
        "User: @{}\nTime: {}\nContent: {}\nLink: {}",
        post.account.username,
        post.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        snippet,
        post.url
    );
    (title, body)
}

/// Sink that only writes a structured log line.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, post: &Post, verdict: &Classification) -> Result<(), NotifyError> {
        tracing::info!(
            target: "notify",
            post_id = %post.id,
            created_at = %post.created_at.to_rfc3339(),
            sentiment = %verdict.sentiment,
            relevant = verdict.relevant,
            url = %post.url,
            "relevant positive post"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Build the sink selected by `notify_method`. Unknown methods are a
/// construction error, not a silent fallback.
pub fn build_sink(cfg: &Config) -> anyhow::Result<Arc<dyn NotificationSink>> {
    match cfg.notify_method.as_str() {
        "log" => Ok(Arc::new(LogSink)),
        "ntfy" => {
            let topic = cfg
                .ntfy_topic
                .clone()
                .ok_or_else(|| anyhow::anyhow!("notify_method = \"ntfy\" requires ntfy_topic"))?;
            Ok(Arc::new(ntfy::NtfySink::new(topic)))
        }
        other => anyhow::bail!("unsupported notification method: {other}"),
    }
}

// --- Test helper ---

/// Records every delivery; optionally fails all of them.
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(String, Sentiment)>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .expect("sink lock poisoned")
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, post: &Post, verdict: &Classification) -> Result<(), NotifyError> {
        self.delivered
            .lock()
            .expect("sink lock poisoned")
            .push((post.id.clone(), verdict.sentiment));
        if self.fail {
            return Err(NotifyError::Transport("recording sink set to fail".into()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// src/notify/ntfy.rs
//! ntfy.sh webhook sink: plain POST with the body as the message, title and
//! tags passed as query parameters to dodge header encoding issues.

use async_trait::async_trait;
use std::time::Duration;

use super::{format_message, NotificationSink, NotifyError};
use crate::classify::Classification;
use crate::feed::Post;

pub struct NtfySink {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    max_retries: u8,
}

impl NtfySink {
    pub fn new(topic: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("https://ntfy.sh/{topic}"),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }
}

#[async_trait]
impl NotificationSink for NtfySink {
    async fn notify(&self, post: &Post, verdict: &Classification) -> Result<(), NotifyError> {
        let (title, body) = format_message(post, verdict);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .query(&[("title", title.as_str()), ("tags", "chart_with_upwards_trend")])
                .header("Priority", "high")
                .body(body.clone())
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(NotifyError::BadStatus(status));
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(NotifyError::Transport(e.to_string()));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "ntfy"
    }
}

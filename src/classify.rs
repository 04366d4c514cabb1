// src/classify.rs
//! Classifier collaborator: judges a post's market relevance and sentiment.
//! The OpenAI provider strips markup before prompting; the keyword provider
//! is a deterministic offline fallback used in mock mode.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::feed::Post;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    #[serde(other)]
    Error,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Error => "error",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-post verdict. Ephemeral; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Classification {
    #[serde(alias = "isRelevant")]
    pub relevant: bool,
    pub sentiment: Sentiment,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier upstream error: {0}")]
    Upstream(String),
    #[error("classifier request timed out")]
    Timeout,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, post: &Post) -> Result<Classification, ClassifyError>;
    fn name(&self) -> &'static str;
}

/// Normalize post content before prompting: decode HTML entities, strip tags,
/// collapse whitespace, cap length.
pub fn normalize_content(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(30);
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a financial sentiment analyzer. You analyze \
social media posts to determine whether they are relevant to the stock market, \
business, or the economy, and what their sentiment is.";

/// OpenAI chat-completions classifier. Requires an API key.
pub struct OpenAiClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClassifier {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(CLASSIFY_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model,
        }
    }

    fn user_prompt(content: &str) -> String {
        format!(
            "Analyze the following social media post for its sentiment regarding \
the stock market or business/economic implications.\n\
Post: \"{content}\"\n\n\
Reply with ONLY this JSON object, no other text:\n\
{{\"relevant\": true|false, \"sentiment\": \"positive\"|\"negative\"|\"neutral\"}}"
        )
    }
}

/// Pull the first JSON object out of the model reply (tolerates code fences
/// and surrounding prose) and decode it.
pub fn parse_verdict(reply: &str) -> Option<Classification> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, post: &Post) -> Result<Classification, ClassifyError> {
        #[derive(serde::Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(serde::Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let content = normalize_content(&post.content);
        let prompt = Self::user_prompt(&content);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.1,
        };

        let resp = self
            .http
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout
                } else {
                    ClassifyError::Upstream(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClassifyError::Upstream(format!(
                "chat completions returned {status}"
            )));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| ClassifyError::Upstream(e.to_string()))?;
        let reply = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");

        parse_verdict(reply)
            .ok_or_else(|| ClassifyError::Upstream(format!("unparseable verdict: {reply:?}")))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

const RELEVANCE_KEYWORDS: &[&str] = &[
    "stock", "market", "economy", "business", "trade", "finance", "economic", "tariff",
];
const POSITIVE_WORDS: &[&str] = &[
    "strong", "up", "gain", "boom", "great", "wonderful", "positive",
];
const NEGATIVE_WORDS: &[&str] = &[
    "down", "fall", "crash", "weak", "trouble", "bad", "negative",
];

/// Deterministic keyword classifier; used when `WATCHER_CLASSIFIER=keyword`
/// and as an offline stand-in in tests.
pub struct KeywordClassifier;

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, post: &Post) -> Result<Classification, ClassifyError> {
        let content = normalize_content(&post.content).to_lowercase();
        let relevant = RELEVANCE_KEYWORDS.iter().any(|k| content.contains(k));
        let sentiment = if !relevant {
            Sentiment::Neutral
        } else if POSITIVE_WORDS.iter().any(|w| content.contains(w)) {
            Sentiment::Positive
        } else if NEGATIVE_WORDS.iter().any(|w| content.contains(w)) {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };
        Ok(Classification {
            relevant,
            sentiment,
        })
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

const ENV_CLASSIFIER_MODE: &str = "WATCHER_CLASSIFIER";
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Factory: keyword mode when requested via env, otherwise the real provider.
pub fn build_classifier(cfg: &Config) -> anyhow::Result<std::sync::Arc<dyn Classifier>> {
    if std::env::var(ENV_CLASSIFIER_MODE)
        .map(|v| v == "keyword")
        .unwrap_or(false)
    {
        return Ok(std::sync::Arc::new(KeywordClassifier));
    }
    let api_key = std::env::var(ENV_OPENAI_API_KEY)
        .map_err(|_| anyhow::anyhow!("missing {ENV_OPENAI_API_KEY} env var"))?;
    Ok(std::sync::Arc::new(OpenAiClassifier::new(
        api_key,
        cfg.openai_model.clone(),
    )))
}

// --- Test helper ---

/// Scripted classifier: fixed verdict per post id, optional per-id failures,
/// records the ids it was asked about.
pub struct ScriptedClassifier {
    verdicts: HashMap<String, Classification>,
    failing: Vec<String>,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedClassifier {
    pub fn new(verdicts: HashMap<String, Classification>) -> Self {
        Self {
            verdicts,
            failing: Vec::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn seen_ids(&self) -> Vec<String> {
        self.seen.lock().expect("classifier lock poisoned").clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, post: &Post) -> Result<Classification, ClassifyError> {
        self.seen
            .lock()
            .expect("classifier lock poisoned")
            .push(post.id.clone());
        if self.failing.contains(&post.id) {
            return Err(ClassifyError::Upstream("scripted failure".into()));
        }
        Ok(self
            .verdicts
            .get(&post.id)
            .copied()
            .unwrap_or(Classification {
                relevant: false,
                sentiment: Sentiment::Neutral,
            }))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

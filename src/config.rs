// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs};

pub const ENV_CONFIG_PATH: &str = "WATCHER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/watcher.toml";

fn default_api_endpoint() -> String {
    "https://truthsocial.com/api/v1/accounts/{account}/statuses?with_muted=true".to_string()
}
fn default_poll_interval() -> u64 {
    60
}
fn default_timezone() -> String {
    "America/New_York".to_string()
}
fn default_start_hour() -> u32 {
    7
}
fn default_end_hour() -> u32 {
    24
}
fn default_state_file() -> PathBuf {
    PathBuf::from("last_seen.txt")
}
fn default_notify_method() -> String {
    "log".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Statuses endpoint template; `{account}` is replaced by `account_id`.
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    pub account_id: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// IANA zone the allowed-hours window is evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Polling allowed in local hours `[poll_start_hour, poll_end_hour)`.
    #[serde(default = "default_start_hour")]
    pub poll_start_hour: u32,
    #[serde(default = "default_end_hour")]
    pub poll_end_hour: u32,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// "log" | "ntfy"
    #[serde(default = "default_notify_method")]
    pub notify_method: String,
    #[serde(default)]
    pub ntfy_topic: Option<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// When set, a Prometheus exporter listens here.
    #[serde(default)]
    pub metrics_listen: Option<SocketAddr>,
}

impl Config {
    /// Load from $WATCHER_CONFIG_PATH, falling back to `config/watcher.toml`.
    pub fn load_default() -> Result<Self> {
        let path = env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config at {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            bail!("account_id is required");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than 0");
        }
        if self.poll_start_hour >= self.poll_end_hour {
            bail!(
                "poll_start_hour ({}) must be before poll_end_hour ({})",
                self.poll_start_hour,
                self.poll_end_hour
            );
        }
        if self.poll_start_hour > 23 || self.poll_end_hour > 24 {
            bail!("polling hours must lie within 0..=23 / 1..=24");
        }
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        chrono_tz::Tz::from_str(&self.timezone)
            .map_err(|_| anyhow!("invalid timezone {:?}", self.timezone))
    }

    /// Fully resolved statuses URL.
    pub fn statuses_url(&self) -> String {
        self.api_endpoint.replace("{account}", &self.account_id)
    }
}

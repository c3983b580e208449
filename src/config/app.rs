// src/config/app.rs
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::FirstRunPolicy;
use crate::store::LAST_SEEN_KEY;
use crate::telemetry::LogFormat;

fn default_feed_name() -> String {
    "News feed".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_state_path() -> PathBuf {
    PathBuf::from("state/watermark.json")
}
fn default_key() -> String {
    LAST_SEEN_KEY.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub store: StoreConfig,
    pub notify: NotifyConfig,
    pub engine: EngineConfig,
    pub schedule: ScheduleConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub url: String,
    /// Shown in the notification subject.
    #[serde(default = "default_feed_name")]
    pub name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: default_feed_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
    #[serde(default = "default_key")]
    pub key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            key: default_key(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Slack,
    /// Render to the log only (dry runs).
    #[default]
    Log,
}

impl std::str::FromStr for ChannelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "slack" => Ok(Self::Slack),
            "log" => Ok(Self::Log),
            other => anyhow::bail!("unknown notify channel: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub channel: ChannelKind,
    /// Offset used when printing publication times, e.g. 9 for JST.
    #[serde(default)]
    pub display_utc_offset_hours: i32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub slack: SlackConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: ChannelKind::default(),
            display_utc_offset_hours: 0,
            timeout_secs: default_timeout_secs(),
            email: EmailConfig::default(),
            slack: SlackConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: String,
    /// Defaults to the transport's port (465 implicit TLS, 587 STARTTLS).
    pub smtp_port: Option<u16>,
    pub starttls: bool,
    pub username: String,
    /// "ENV" means: read from SMTP_PASS
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// "ENV" means: read from SLACK_WEBHOOK_URL
    pub webhook_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub first_run: FirstRunPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 0 runs a single cycle and exits.
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
    pub metrics_addr: Option<SocketAddr>,
}

// src/config/mod.rs
//! Configuration loading: file (TOML or JSON), then environment overrides,
//! then secret resolution and validation.

pub mod app;

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use self::app::{
    AppConfig, ChannelKind, EmailConfig, EngineConfig, FeedConfig, NotifyConfig, ScheduleConfig,
    SlackConfig, StoreConfig, TelemetryConfig,
};

pub const ENV_CONFIG_PATH: &str = "FEED_NOTIFIER_CONFIG";
pub const DEFAULT_TOML_PATH: &str = "config/feed_notifier.toml";
pub const DEFAULT_JSON_PATH: &str = "config/feed_notifier.json";

impl AppConfig {
    /// Parse an explicit file. The extension picks the format; unknown extensions try both.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_config(&content, &ext).with_context(|| format!("parsing {}", path.display()))
    }

    /// Locate the file via env var + fallbacks:
    /// 1) $FEED_NOTIFIER_CONFIG
    /// 2) config/feed_notifier.toml
    /// 3) config/feed_notifier.json
    /// 4) built-in defaults
    ///
    /// Then applies environment overrides, resolves "ENV" secrets and validates.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_file_default()?;
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        cfg.resolve_secrets(|k| std::env::var(k).ok())?;
        cfg.sanitize();
        cfg.validate()?;
        Ok(cfg)
    }

    fn load_file_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from(&pb);
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::default())
    }

    /// Override fields from variables returned by `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("FEED_URL") {
            self.feed.url = v;
        }
        if let Some(v) = get("FEED_NAME") {
            self.feed.name = v;
        }
        if let Some(v) = get("STATE_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = get("WATERMARK_KEY") {
            self.store.key = v;
        }
        if let Some(v) = get("NOTIFY_CHANNEL") {
            self.notify.channel = v.parse()?;
        }
        if let Some(v) = get("FIRST_RUN_POLICY") {
            self.engine.first_run = v.parse()?;
        }
        if let Some(v) = get("CHECK_INTERVAL_SECS") {
            self.schedule.interval_secs = parse_var("CHECK_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("SMTP_HOST") {
            self.notify.email.smtp_host = v;
        }
        if let Some(v) = get("SMTP_PORT") {
            self.notify.email.smtp_port = Some(parse_var("SMTP_PORT", &v)?);
        }
        if let Some(v) = get("SMTP_USER") {
            self.notify.email.username = v;
        }
        if let Some(v) = get("SMTP_PASS") {
            self.notify.email.password = v;
        }
        if let Some(v) = get("NOTIFY_EMAIL_FROM") {
            self.notify.email.from = v;
        }
        if let Some(v) = get("NOTIFY_EMAIL_TO") {
            self.notify.email.to = split_list(&v);
        }
        if let Some(v) = get("SLACK_WEBHOOK_URL") {
            self.notify.slack.webhook_url = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.telemetry.log_format = v.parse()?;
        }
        if let Some(v) = get("METRICS_ADDR") {
            self.telemetry.metrics_addr = Some(parse_var("METRICS_ADDR", &v)?);
        }
        Ok(())
    }

    /// Replace literal "ENV" secrets with the matching variable.
    pub fn resolve_secrets<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.notify.email.password.trim().eq_ignore_ascii_case("env") {
            self.notify.email.password =
                lookup("SMTP_PASS").ok_or_else(|| anyhow!("Missing SMTP_PASS env var"))?;
        }
        if self.notify.slack.webhook_url.trim().eq_ignore_ascii_case("env") {
            self.notify.slack.webhook_url = lookup("SLACK_WEBHOOK_URL")
                .ok_or_else(|| anyhow!("Missing SLACK_WEBHOOK_URL env var"))?;
        }
        Ok(())
    }

    /// Clamp values that have a safe fallback instead of failing startup.
    pub fn sanitize(&mut self) {
        if !(-23..=23).contains(&self.notify.display_utc_offset_hours) {
            tracing::warn!(
                offset = self.notify.display_utc_offset_hours,
                "display_utc_offset_hours out of range, using UTC"
            );
            self.notify.display_utc_offset_hours = 0;
        }
        if self.feed.timeout_secs == 0 {
            self.feed.timeout_secs = 10;
        }
        if self.notify.timeout_secs == 0 {
            self.notify.timeout_secs = 10;
        }
        self.notify.email.to.retain(|a| !a.trim().is_empty());
    }

    /// Refuse to start with a config that cannot complete a cycle.
    pub fn validate(&self) -> Result<()> {
        let url = self.feed.url.trim();
        if url.is_empty() {
            bail!("feed.url is required (or set FEED_URL)");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("feed.url must be an http(s) URL: {url}");
        }
        if self.store.key.trim().is_empty() {
            bail!("store.key must not be empty");
        }
        match self.notify.channel {
            ChannelKind::Email => {
                let e = &self.notify.email;
                if e.smtp_host.trim().is_empty() || e.from.trim().is_empty() || e.to.is_empty() {
                    bail!("email channel requires smtp_host, from and at least one recipient");
                }
            }
            ChannelKind::Slack => {
                if self.notify.slack.webhook_url.trim().is_empty() {
                    bail!("slack channel requires webhook_url (or SLACK_WEBHOOK_URL)");
                }
            }
            ChannelKind::Log => {}
        }
        Ok(())
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => toml::from_str::<AppConfig>(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| serde_json::from_str(s).map_err(anyhow::Error::from))
            .map_err(|_| anyhow!("unsupported config format")),
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow!("invalid {name}={raw:?}: {e}"))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FirstRunPolicy;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn toml_sections_and_defaults() {
        let cfg = parse_config(
            r#"
[feed]
url = "https://spitz-web.com/news/feed"

[notify]
channel = "email"
display_utc_offset_hours = 9

[notify.email]
smtp_host = "smtp.example.com"
from = "bot@example.com"
to = ["me@example.com"]
"#,
            "toml",
        )
        .unwrap();
        assert_eq!(cfg.feed.name, "News feed");
        assert_eq!(cfg.feed.timeout_secs, 10);
        assert_eq!(cfg.store.key, "last_seen_pub_timestamp");
        assert_eq!(cfg.notify.channel, ChannelKind::Email);
        assert_eq!(cfg.engine.first_run, FirstRunPolicy::NotifyAll);
        assert_eq!(cfg.schedule.interval_secs, 0);
        cfg.validate().unwrap();
    }

    #[test]
    fn env_overrides_win_and_lists_split() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(lookup(&[
            ("FEED_URL", "https://e.com/rss"),
            ("NOTIFY_CHANNEL", "Email"),
            ("NOTIFY_EMAIL_TO", "a@e.com, b@e.com;"),
            ("FIRST_RUN_POLICY", "seed"),
            ("CHECK_INTERVAL_SECS", "900"),
            ("SMTP_HOST", "   "),
        ]))
        .unwrap();
        assert_eq!(cfg.feed.url, "https://e.com/rss");
        assert_eq!(cfg.notify.channel, ChannelKind::Email);
        assert_eq!(cfg.notify.email.to, vec!["a@e.com", "b@e.com"]);
        assert_eq!(cfg.engine.first_run, FirstRunPolicy::Seed);
        assert_eq!(cfg.schedule.interval_secs, 900);
        assert!(cfg.notify.email.smtp_host.is_empty());
    }

    #[test]
    fn bad_numeric_override_is_an_error() {
        let mut cfg = AppConfig::default();
        let err = cfg
            .apply_overrides(lookup(&[("CHECK_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CHECK_INTERVAL_SECS"));
    }

    #[test]
    fn env_secret_is_resolved_or_rejected() {
        let mut cfg = AppConfig::default();
        cfg.notify.email.password = "ENV".into();
        cfg.resolve_secrets(lookup(&[("SMTP_PASS", "hunter2")])).unwrap();
        assert_eq!(cfg.notify.email.password, "hunter2");

        let mut missing = AppConfig::default();
        missing.notify.slack.webhook_url = "env".into();
        assert!(missing.resolve_secrets(lookup(&[])).is_err());
    }

    #[test]
    fn validate_requires_feed_url_and_channel_settings() {
        let mut cfg = AppConfig::default();
        assert!(cfg.validate().is_err());

        cfg.feed.url = "ftp://e.com/feed".into();
        assert!(cfg.validate().is_err());

        cfg.feed.url = "https://e.com/feed".into();
        cfg.validate().unwrap();

        cfg.notify.channel = ChannelKind::Slack;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        let mut cfg = AppConfig::default();
        cfg.notify.display_utc_offset_hours = 40;
        cfg.sanitize();
        assert_eq!(cfg.notify.display_utc_offset_hours, 0);
    }
}

// src/notify/mod.rs
pub mod email;
pub mod log;
pub mod slack;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::config::{ChannelKind, NotifyConfig};
use crate::model::NotificationPayload;

pub use self::email::EmailNotifier;
pub use self::log::LogNotifier;
pub use self::slack::SlackNotifier;

/// Single dispatch call per cycle. Success or failure, nothing in between.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, payload: &NotificationPayload) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
}

/// Turns a payload into human-readable text. Times are shown in a fixed display offset.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    feed_name: String,
    offset: FixedOffset,
}

impl MessageRenderer {
    pub fn new(feed_name: impl Into<String>, utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        Self {
            feed_name: feed_name.into(),
            offset,
        }
    }

    pub fn render(&self, payload: &NotificationPayload) -> NotificationMessage {
        let n = payload.count();
        let noun = if n == 1 { "item" } else { "items" };
        let subject = format!("[{}] {n} new {noun}", self.feed_name);

        let mut body = format!("{n} new {noun} on {}:\n\n", self.feed_name);
        for item in payload.items() {
            body.push_str(&format!("Title: {}\n", item.title));
            body.push_str(&format!("URL: {}\n", item.link));
            body.push_str(&format!(
                "Published: {} ({})\n\n",
                self.format_time(item.published_at),
                self.offset_label()
            ));
        }

        NotificationMessage { subject, body }
    }

    pub fn format_time(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.offset)
            .format("%Y/%m/%d %H:%M")
            .to_string()
    }

    fn offset_label(&self) -> String {
        if self.offset.local_minus_utc() == 0 {
            "UTC".to_string()
        } else {
            format!("UTC{}", self.offset)
        }
    }
}

/// Build the one channel the deployment is configured for.
pub fn build_notifier(cfg: &NotifyConfig, feed_name: &str) -> Result<Arc<dyn Notifier>> {
    let renderer = MessageRenderer::new(feed_name, cfg.display_utc_offset_hours);
    let timeout = Duration::from_secs(cfg.timeout_secs);
    let notifier: Arc<dyn Notifier> = match cfg.channel {
        ChannelKind::Email => Arc::new(EmailNotifier::new(&cfg.email, timeout, renderer)?),
        ChannelKind::Slack => Arc::new(SlackNotifier::new(
            cfg.slack.webhook_url.clone(),
            timeout,
            renderer,
        )?),
        ChannelKind::Log => Arc::new(LogNotifier::new(renderer)),
    };
    Ok(notifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeedItem;
    use chrono::TimeZone;

    fn payload() -> NotificationPayload {
        NotificationPayload::new(vec![
            FeedItem::new(
                "7914",
                "Fan club event",
                "https://spitz-web.com/news/7914/",
                Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap(),
            ),
            FeedItem::new(
                "7915",
                "New single",
                "https://spitz-web.com/news/7915/",
                Utc.with_ymd_and_hms(2026, 2, 18, 15, 30, 0).unwrap(),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn subject_counts_items() {
        let msg = MessageRenderer::new("Spitz News", 0).render(&payload());
        assert_eq!(msg.subject, "[Spitz News] 2 new items");
    }

    #[test]
    fn body_lists_items_in_payload_order_with_display_offset() {
        let msg = MessageRenderer::new("Spitz News", 9).render(&payload());
        let first = msg.body.find("Fan club event").unwrap();
        let second = msg.body.find("New single").unwrap();
        assert!(first < second);
        assert!(msg.body.contains("URL: https://spitz-web.com/news/7915/"));
        // 15:30 UTC is 00:30 next day in JST
        assert!(msg.body.contains("Published: 2026/02/19 00:30 (UTC+09:00)"), "{}", msg.body);
    }

    #[test]
    fn utc_label_when_no_offset() {
        let r = MessageRenderer::new("Feed", 0);
        let msg = r.render(&payload());
        assert!(msg.body.contains("Published: 2026/02/17 12:00 (UTC)"));
    }
}

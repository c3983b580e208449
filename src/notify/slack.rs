// src/notify/slack.rs
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use super::{MessageRenderer, Notifier};
use crate::model::NotificationPayload;

/// Incoming-webhook notifier. Non-2xx responses count as failed delivery.
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    renderer: MessageRenderer,
}

impl SlackNotifier {
    pub fn new(webhook_url: String, timeout: Duration, renderer: MessageRenderer) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building slack http client")?;
        Ok(Self {
            webhook_url,
            client,
            renderer,
        })
    }

    pub fn webhook_body(&self, payload: &NotificationPayload) -> serde_json::Value {
        let msg = self.renderer.render(payload);
        serde_json::json!({ "text": format!("*{}*\n{}", msg.subject, msg.body.trim_end()) })
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<()> {
        let body = self.webhook_body(payload);
        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        tracing::info!(items = payload.count(), "slack notification sent");
        Ok(())
    }
}

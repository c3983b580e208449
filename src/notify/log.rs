// src/notify/log.rs
use anyhow::Result;

use super::{MessageRenderer, Notifier};
use crate::model::NotificationPayload;

/// Writes the rendered message to the log instead of delivering it.
pub struct LogNotifier {
    renderer: MessageRenderer,
}

impl LogNotifier {
    pub fn new(renderer: MessageRenderer) -> Self {
        Self { renderer }
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<()> {
        let msg = self.renderer.render(payload);
        tracing::info!(
            target: "notify",
            subject = %msg.subject,
            body = %msg.body,
            "notification (log channel)"
        );
        Ok(())
    }
}

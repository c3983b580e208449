// src/notify/email.rs
use std::time::Duration;

use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{MessageRenderer, NotificationMessage, Notifier};
use crate::config::EmailConfig;
use crate::model::NotificationPayload;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    renderer: MessageRenderer,
}

impl EmailNotifier {
    pub fn new(cfg: &EmailConfig, timeout: Duration, renderer: MessageRenderer) -> Result<Self> {
        let host = cfg.smtp_host.trim();
        let mut builder = if cfg.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        }
        .with_context(|| format!("invalid SMTP host {host:?}"))?;

        if let Some(port) = cfg.smtp_port {
            builder = builder.port(port);
        }
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ));
        }
        let mailer = builder.timeout(Some(timeout)).build();

        let (from, to) = parse_addresses(&cfg.from, &cfg.to)?;
        Ok(Self {
            mailer,
            from,
            to,
            renderer,
        })
    }
}

pub fn parse_addresses(from: &str, to: &[String]) -> Result<(Mailbox, Vec<Mailbox>)> {
    let from: Mailbox = from
        .trim()
        .parse()
        .with_context(|| format!("invalid sender address {from:?}"))?;
    let to = to
        .iter()
        .map(|a| {
            a.trim()
                .parse::<Mailbox>()
                .with_context(|| format!("invalid recipient address {a:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((from, to))
}

/// Plain-text message for every recipient.
pub fn build_email(from: &Mailbox, to: &[Mailbox], msg: &NotificationMessage) -> Result<Message> {
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(msg.subject.clone())
        .header(header::ContentType::TEXT_PLAIN);
    for rcpt in to {
        builder = builder.to(rcpt.clone());
    }
    builder.body(msg.body.clone()).context("build email")
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<()> {
        let rendered = self.renderer.render(payload);
        let msg = build_email(&self.from, &self.to, &rendered)?;
        self.mailer.send(msg).await.context("send email")?;
        tracing::info!(
            recipients = self.to.len(),
            items = payload.count(),
            "email notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_validated() {
        let (from, to) =
            parse_addresses("Feed Bot <bot@example.com>", &["me@example.com".into()]).unwrap();
        assert_eq!(from.email.to_string(), "bot@example.com");
        assert_eq!(to.len(), 1);

        assert!(parse_addresses("not an address", &[]).is_err());
        assert!(parse_addresses("bot@example.com", &["@@".into()]).is_err());
    }

    #[test]
    fn message_carries_subject_and_body() {
        let (from, to) = parse_addresses(
            "bot@example.com",
            &["a@example.com".into(), "b@example.com".into()],
        )
        .unwrap();
        let msg = NotificationMessage {
            subject: "[Feed] 1 new item".into(),
            body: "Title: Hello\nURL: https://e.com/1\n".into(),
        };
        let email = build_email(&from, &to, &msg).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Subject: [Feed] 1 new item"), "{raw}");
        assert!(raw.contains("a@example.com"));
        assert!(raw.contains("b@example.com"));
        assert!(raw.contains("Title: Hello"));
    }
}

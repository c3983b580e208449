// src/feed/rss.rs
//! RSS 2.0 / Atom source. Serves either a fixed XML document or an HTTP endpoint.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use super::{ensure_metrics_described, normalize_title, FeedSource};
use crate::model::FeedItem;

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Element whose attributes we do not care about (`<guid isPermaLink>`, `<title type>`).
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Entries recovered from one document, plus how many were unusable.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub items: Vec<FeedItem>,
    pub skipped: usize,
}

pub struct RssFeedSource {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeedSource {
    /// Serve a fixed document; every fetch re-parses it.
    pub fn from_fixture_str(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        })
    }

    async fn download(url: &str, client: &reqwest::Client) -> Result<String> {
        let resp = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("feed http get {url}"))?
            .error_for_status()
            .context("feed non-2xx")?;
        resp.text().await.context("feed http .text()")
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>> {
        ensure_metrics_described();
        let t0 = std::time::Instant::now();

        let res = match &self.mode {
            Mode::Fixture(xml) => parse_document(xml),
            Mode::Http { url, client } => match Self::download(url, client).await {
                Ok(body) => parse_document(&body),
                Err(e) => Err(e),
            },
        };

        let parsed = match res {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), feed = %self.name, "feed fetch failed");
                counter!("feed_fetch_errors_total").increment(1);
                return Err(e);
            }
        };

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("feed_fetch_ms").record(ms);
        counter!("feed_items_fetched_total").increment(parsed.items.len() as u64);
        if parsed.skipped > 0 {
            counter!("feed_items_skipped_total").increment(parsed.skipped as u64);
        }
        tracing::debug!(
            feed = %self.name,
            items = parsed.items.len(),
            skipped = parsed.skipped,
            elapsed_ms = ms,
            "feed fetched"
        );
        Ok(parsed.items)
    }
}

/// Parse an RSS 2.0 or Atom document. Anything else is an error.
pub fn parse_document(xml: &str) -> Result<ParsedFeed> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    match root_element(&xml_clean)?.as_str() {
        "rss" => {
            let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;
            Ok(collect(rss.channel.items.into_iter().map(rss_item)))
        }
        "feed" => {
            let feed: AtomFeed = from_str(&xml_clean).context("parsing atom xml")?;
            Ok(collect(feed.entries.into_iter().map(atom_entry)))
        }
        other => Err(anyhow!("unrecognized feed root element <{other}>")),
    }
}

fn collect(entries: impl Iterator<Item = Option<FeedItem>>) -> ParsedFeed {
    let mut out = ParsedFeed::default();
    for entry in entries {
        match entry {
            Some(item) => out.items.push(item),
            None => out.skipped += 1,
        }
    }
    out
}

fn rss_item(it: RssItem) -> Option<FeedItem> {
    let title = it.title.as_deref().map(normalize_title).unwrap_or_default();
    let link = it.link.map(|l| l.trim().to_string()).unwrap_or_default();
    let id = it
        .guid
        .map(|g| g.value.trim().to_string())
        .filter(|g| !g.is_empty())
        .or_else(|| Some(link.clone()).filter(|l| !l.is_empty()))
        .or_else(|| Some(title.clone()).filter(|t| !t.is_empty()));

    finish(id, title, link, it.pub_date.as_deref())
}

fn atom_entry(e: AtomEntry) -> Option<FeedItem> {
    let title = e
        .title
        .map(|t| normalize_title(&t.value))
        .unwrap_or_default();
    let link = e
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| e.links.first())
        .and_then(|l| l.href.as_deref())
        .map(|h| h.trim().to_string())
        .unwrap_or_default();
    let id = e
        .id
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .or_else(|| Some(link.clone()).filter(|l| !l.is_empty()));
    let date = e.published.as_deref().or(e.updated.as_deref());

    finish(id, title, link, date)
}

fn finish(
    id: Option<String>,
    title: String,
    link: String,
    date: Option<&str>,
) -> Option<FeedItem> {
    let Some(id) = id else {
        tracing::warn!(%title, "skipping feed entry without identifier");
        return None;
    };
    let Some(published_at) = date.and_then(parse_date) else {
        tracing::warn!(%id, raw_date = ?date, "skipping feed entry without a parseable date");
        return None;
    };
    // Markup-only titles (Atom `type="xhtml"`) come out empty.
    let title = if !title.is_empty() {
        title
    } else if !link.is_empty() {
        link.clone()
    } else {
        id.clone()
    };
    Some(FeedItem {
        id,
        title,
        link,
        published_at,
    })
}

/// RFC 2822 (RSS `pubDate`) or RFC 3339 (Atom), normalized to UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn root_element(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().context("reading feed root element")? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::Eof => bail!("feed document has no root element"),
            _ => {}
        }
    }
}

// HTML named entities are not valid XML; blogs emit them anyway.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc2822_and_rfc3339_dates_parse_to_utc() {
        let want = Utc.with_ymd_and_hms(2026, 2, 18, 12, 0, 0).unwrap();
        assert_eq!(parse_date("Wed, 18 Feb 2026 21:00:00 +0900"), Some(want));
        assert_eq!(parse_date(" Wed, 18 Feb 2026 12:00:00 GMT "), Some(want));
        assert_eq!(parse_date("2026-02-18T12:00:00Z"), Some(want));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn rss_guid_falls_back_to_link() {
        let xml = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>A</title><link>https://e.com/a</link>
                <pubDate>Wed, 18 Feb 2026 12:00:00 +0000</pubDate></item>
            <item><title>B</title><link>https://e.com/b</link>
                <guid isPermaLink="false">b-1</guid>
                <pubDate>Wed, 18 Feb 2026 13:00:00 +0000</pubDate></item>
        </channel></rss>"#;
        let parsed = parse_document(xml).unwrap();
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.items[0].id, "https://e.com/a");
        assert_eq!(parsed.items[1].id, "b-1");
    }

    #[test]
    fn undated_entries_are_skipped() {
        let xml = r#"<rss version="2.0"><channel><title>t</title>
            <item><title>No date</title><link>https://e.com/x</link></item>
            <item><title>Bad date</title><link>https://e.com/y</link><pubDate>soon</pubDate></item>
        </channel></rss>"#;
        let parsed = parse_document(xml).unwrap();
        assert!(parsed.items.is_empty());
        assert_eq!(parsed.skipped, 2);
    }

    #[test]
    fn channel_without_items_is_empty_not_error() {
        let xml = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel><title>t</title></channel></rss>"#;
        let parsed = parse_document(xml).unwrap();
        assert!(parsed.items.is_empty());
    }

    #[test]
    fn items_split_by_other_channel_elements_are_all_kept() {
        let xml = r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel>
            <title>t</title>
            <item><title>A</title><guid>a</guid>
                <pubDate>Wed, 18 Feb 2026 12:00:00 +0000</pubDate></item>
            <atom:link href="https://e.com/feed" rel="self" type="application/rss+xml"/>
            <item><title>B</title><guid>b</guid>
                <pubDate>Wed, 18 Feb 2026 13:00:00 +0000</pubDate></item>
            <lastBuildDate>Wed, 18 Feb 2026 13:00:00 +0000</lastBuildDate>
            <item><title>C</title><guid>c</guid>
                <pubDate>Wed, 18 Feb 2026 14:00:00 +0000</pubDate></item>
        </channel></rss>"#;
        let parsed = parse_document(xml).unwrap();
        let ids: Vec<_> = parsed.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn xhtml_atom_title_falls_back_to_link() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry><id>tag:e.com,2026:x</id>
                <title type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml">Hi</div></title>
                <link href="https://e.com/x"/>
                <updated>2026-02-18T12:00:00Z</updated></entry>
            <entry><id>tag:e.com,2026:y</id><title></title>
                <updated>2026-02-18T13:00:00Z</updated></entry>
        </feed>"#;
        let parsed = parse_document(xml).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert!(!parsed.items[0].title.is_empty());
        assert_eq!(parsed.items[1].title, "tag:e.com,2026:y");
    }

    #[test]
    fn html_document_is_rejected() {
        let err = parse_document("<html><body>maintenance</body></html>").unwrap_err();
        assert!(err.to_string().contains("html"), "{err}");
    }
}

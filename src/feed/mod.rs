// src/feed/mod.rs
pub mod rss;

use crate::model::FeedItem;
use anyhow::Result;
use metrics::{describe_counter, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};

pub use self::rss::RssFeedSource;

/// Produces the entries of the watched feed for the current cycle.
///
/// Transport and parse failures surface as a single error; an empty feed is `Ok(vec![])`.
/// No ordering is assumed from the source.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<Vec<FeedItem>>;
}

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feed_items_fetched_total",
            "Entries parsed from the feed document."
        );
        describe_counter!(
            "feed_items_skipped_total",
            "Entries dropped for a missing date or identifier."
        );
        describe_counter!("feed_fetch_errors_total", "Feed download/parse errors.");
        describe_histogram!("feed_fetch_ms", "Feed download + parse time in milliseconds.");
    });
}

/// Normalize a title: decode entities, strip tags, collapse whitespace.
pub fn normalize_title(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: Lazy<regex::Regex> =
        Lazy::new(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("static regex"));
    let stripped = RE_TAGS.replace_all(&decoded, "");

    static RE_WS: Lazy<regex::Regex> =
        Lazy::new(|| regex::Regex::new(r"\s+").expect("static regex"));
    RE_WS.replace_all(&stripped, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_title_decodes_and_collapses() {
        assert_eq!(
            normalize_title("  New&nbsp;single <b>out</b>\n now &amp; then "),
            "New single out now & then"
        );
    }

    #[test]
    fn normalize_title_keeps_plain_text() {
        assert_eq!(normalize_title("Tour 2026"), "Tour 2026");
        assert_eq!(normalize_title("   "), "");
    }
}

// src/model.rs
//! Value types shared by the detection engine and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One feed entry, normalized from whatever format the source speaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Stable identifier (guid, Atom id, or the link as a fallback).
    pub id: String,
    pub title: String,
    pub link: String,
    /// Sole ordering and comparison key.
    pub published_at: DateTime<Utc>,
}

impl FeedItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            link: link.into(),
            published_at,
        }
    }

    /// Deterministic ordering: publication time, then id for ties.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.published_at, self.id.as_str())
    }
}

/// Last-seen marker. `present == false` means no cycle has ever committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub timestamp: DateTime<Utc>,
    pub present: bool,
}

impl Watermark {
    pub fn absent() -> Self {
        Self {
            timestamp: DateTime::<Utc>::MIN_UTC,
            present: false,
        }
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            present: true,
        }
    }

    /// Detection threshold; the minimum instant when nothing was stored yet.
    pub fn threshold(&self) -> DateTime<Utc> {
        if self.present {
            self.timestamp
        } else {
            DateTime::<Utc>::MIN_UTC
        }
    }

    /// Strictly newer only: an item exactly at the watermark was already notified.
    pub fn admits(&self, item: &FeedItem) -> bool {
        item.published_at > self.threshold()
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::absent()
    }
}

/// Items of one notification, ascending by publication time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    items: Vec<FeedItem>,
    count: usize,
}

impl NotificationPayload {
    /// Returns `None` for an empty list; a payload always carries at least one item.
    pub fn new(items: Vec<FeedItem>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let count = items.len();
        Some(Self { items, count })
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Maximum `published_at` among the included items.
    pub fn newest(&self) -> DateTime<Utc> {
        self.items
            .iter()
            .map(|it| it.published_at)
            .max()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

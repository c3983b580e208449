//! # Detection Engine
//! One detection cycle: read the watermark, fetch the feed, pick the strictly
//! newer entries, notify once, and only then advance the watermark.
//!
//! The engine keeps no state between cycles. Every cycle is a function of
//! (stored watermark, fetched items), so a retried or overlapping cycle
//! recomputes the same diff. Delivery is at-least-once: a failure after the
//! notification (store write) leads to a duplicate next time, never a lost item.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::feed::FeedSource;
use crate::model::{FeedItem, NotificationPayload, Watermark};
use crate::notify::Notifier;
use crate::store::{WatermarkStore, LAST_SEEN_KEY};

/// What to do when no watermark has ever been stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstRunPolicy {
    /// Notify once for the whole current backlog.
    #[default]
    NotifyAll,
    /// Record the newest entry as seen without notifying.
    Seed,
}

impl std::str::FromStr for FirstRunPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "notify_all" | "notify" => Ok(Self::NotifyAll),
            "seed" => Ok(Self::Seed),
            other => anyhow::bail!("unknown first-run policy: {other}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("reading watermark failed: {0:#}")]
    StoreRead(anyhow::Error),
    #[error("fetching feed failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("sending notification failed: {0:#}")]
    Notify(anyhow::Error),
    #[error("writing watermark failed: {0:#}")]
    StoreWrite(anyhow::Error),
}

impl CycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::StoreRead(_) => "store_read",
            CycleError::Fetch(_) => "fetch",
            CycleError::Notify(_) => "notify",
            CycleError::StoreWrite(_) => "store_write",
        }
    }
}

#[derive(Debug)]
pub enum CycleResult {
    /// Nothing newer than the watermark; nothing was written or sent.
    NoNewItems,
    /// One notification sent for `count` items; watermark advanced to `watermark`.
    Notified {
        count: usize,
        watermark: DateTime<Utc>,
    },
    /// First run under [`FirstRunPolicy::Seed`]: watermark recorded, nothing sent.
    Seeded {
        skipped: usize,
        watermark: DateTime<Utc>,
    },
    Failed(CycleError),
}

impl CycleResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, CycleResult::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            CycleResult::NoNewItems => "no_new_items",
            CycleResult::Notified { .. } => "notified",
            CycleResult::Seeded { .. } => "seeded",
            CycleResult::Failed(_) => "failed",
        }
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cycle_runs_total", "Detection cycles by result.");
        describe_counter!("cycle_failures_total", "Failed cycles by error kind.");
        describe_counter!(
            "cycle_new_items_total",
            "Items included in dispatched notifications."
        );
        describe_gauge!(
            "watermark_unix_ts",
            "Unix ts of the last committed watermark."
        );
        describe_gauge!(
            "scheduler_last_cycle_ts",
            "Unix ts at which the scheduler last finished a cycle."
        );
    });
}

/// Strictly-newer entries, ascending by `(published_at, id)`, one per id.
/// A repeated id keeps its newest copy so the committed watermark covers it.
pub fn select_new_items(items: Vec<FeedItem>, watermark: &Watermark) -> Vec<FeedItem> {
    let mut fresh: Vec<FeedItem> = items.into_iter().filter(|it| watermark.admits(it)).collect();
    fresh.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut seen: HashSet<String> = HashSet::with_capacity(fresh.len());
    let mut newest_first: Vec<FeedItem> = fresh
        .into_iter()
        .rev()
        .filter(|it| seen.insert(it.id.clone()))
        .collect();
    newest_first.reverse();
    newest_first
}

pub struct DetectionEngine {
    source: Arc<dyn FeedSource>,
    store: Arc<dyn WatermarkStore>,
    notifier: Arc<dyn Notifier>,
    key: String,
    first_run: FirstRunPolicy,
}

impl DetectionEngine {
    pub fn new(
        source: Arc<dyn FeedSource>,
        store: Arc<dyn WatermarkStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            key: LAST_SEEN_KEY.to_string(),
            first_run: FirstRunPolicy::default(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_first_run(mut self, policy: FirstRunPolicy) -> Self {
        self.first_run = policy;
        self
    }

    /// Run one cycle to completion. Never panics and never retries internally.
    pub async fn run_cycle(&self) -> CycleResult {
        ensure_metrics_described();
        let t0 = Instant::now();

        let result = self.cycle().await;

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        counter!("cycle_runs_total", "result" => result.label()).increment(1);
        match &result {
            CycleResult::NoNewItems => {
                info!(feed = self.source.name(), elapsed_ms, "no new items");
            }
            CycleResult::Notified { count, watermark } => {
                counter!("cycle_new_items_total").increment(*count as u64);
                gauge!("watermark_unix_ts").set(watermark.timestamp() as f64);
                info!(
                    feed = self.source.name(),
                    notifier = self.notifier.name(),
                    count,
                    watermark = %watermark,
                    elapsed_ms,
                    "notified new items"
                );
            }
            CycleResult::Seeded { skipped, watermark } => {
                gauge!("watermark_unix_ts").set(watermark.timestamp() as f64);
                info!(
                    feed = self.source.name(),
                    skipped,
                    watermark = %watermark,
                    "first run: watermark seeded without notification"
                );
            }
            CycleResult::Failed(e) => {
                counter!("cycle_failures_total", "kind" => e.kind()).increment(1);
                warn!(
                    feed = self.source.name(),
                    kind = e.kind(),
                    error = %e,
                    elapsed_ms,
                    "cycle failed"
                );
            }
        }
        result
    }

    async fn cycle(&self) -> CycleResult {
        let watermark = match self.store.get(&self.key).await {
            Ok(w) => w,
            Err(e) => return CycleResult::Failed(CycleError::StoreRead(e)),
        };
        debug!(
            key = %self.key,
            present = watermark.present,
            watermark = %watermark.timestamp,
            "watermark loaded"
        );

        let items = match self.source.fetch().await {
            Ok(items) => items,
            Err(e) => return CycleResult::Failed(CycleError::Fetch(e)),
        };
        let fetched = items.len();

        let fresh = select_new_items(items, &watermark);
        debug!(fetched, fresh = fresh.len(), "feed diffed against watermark");

        let Some(payload) = NotificationPayload::new(fresh) else {
            return CycleResult::NoNewItems;
        };
        let newest = payload.newest();

        if !watermark.present && self.first_run == FirstRunPolicy::Seed {
            return match self.store.set(&self.key, newest).await {
                Ok(()) => CycleResult::Seeded {
                    skipped: payload.count(),
                    watermark: newest,
                },
                Err(e) => CycleResult::Failed(CycleError::StoreWrite(e)),
            };
        }

        if let Err(e) = self.notifier.send(&payload).await {
            return CycleResult::Failed(CycleError::Notify(e));
        }

        // Commit only after delivery succeeded.
        match self.store.set(&self.key, newest).await {
            Ok(()) => CycleResult::Notified {
                count: payload.count(),
                watermark: newest,
            },
            Err(e) => CycleResult::Failed(CycleError::StoreWrite(e)),
        }
    }
}

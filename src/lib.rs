// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod engine;
pub mod feed;
pub mod model;
pub mod notify;
pub mod scheduler;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::engine::{CycleError, CycleResult, DetectionEngine, FirstRunPolicy};
pub use crate::feed::{FeedSource, RssFeedSource};
pub use crate::model::{FeedItem, NotificationPayload, Watermark};
pub use crate::notify::{Notifier, NotificationMessage};
pub use crate::store::{FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

/// Wire the configured collaborators into an engine.
pub fn build_engine(cfg: &AppConfig) -> anyhow::Result<DetectionEngine> {
    let source = RssFeedSource::from_url(
        cfg.feed.name.clone(),
        cfg.feed.url.clone(),
        Duration::from_secs(cfg.feed.timeout_secs),
    )?;
    let store = FileWatermarkStore::new(cfg.store.path.clone());
    let notifier = notify::build_notifier(&cfg.notify, &cfg.feed.name)?;

    info!(
        feed = %cfg.feed.url,
        state = %store.path().display(),
        key = %cfg.store.key,
        channel = notifier.name(),
        first_run = ?cfg.engine.first_run,
        "engine configured"
    );

    Ok(
        DetectionEngine::new(Arc::new(source), Arc::new(store), notifier)
            .with_key(cfg.store.key.clone())
            .with_first_run(cfg.engine.first_run),
    )
}

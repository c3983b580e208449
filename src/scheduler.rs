// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::DetectionEngine;

/// Fixed-cadence trigger: one cycle per tick, first tick immediately.
///
/// A cycle that overruns the interval delays the next tick instead of
/// firing a burst of catch-up cycles.
pub fn spawn_scheduler(engine: Arc<DetectionEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let result = engine.run_cycle().await;
            let now = chrono::Utc::now().timestamp().max(0);
            gauge!("scheduler_last_cycle_ts").set(now as f64);
            tracing::debug!(
                target: "scheduler",
                success = result.is_success(),
                next_in_secs = interval.as_secs(),
                "scheduled cycle finished"
            );
        }
    })
}

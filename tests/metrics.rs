// tests/metrics.rs
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use feed_notifier::notify::{LogNotifier, MessageRenderer};
use feed_notifier::{CycleResult, DetectionEngine, MemoryWatermarkStore, RssFeedSource};
use metrics_exporter_prometheus::PrometheusBuilder;

const RSS: &str = include_str!("fixtures/news_rss.xml");

#[test]
fn cycle_and_feed_series_are_exposed() {
    // Local recorder so parallel tests do not fight over the global one.
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let engine = DetectionEngine::new(
        Arc::new(RssFeedSource::from_fixture_str("Band News", RSS)),
        Arc::new(MemoryWatermarkStore::with_value(
            "last_seen_pub_timestamp",
            Utc.with_ymd_and_hms(2026, 2, 16, 0, 0, 0).unwrap(),
        )),
        Arc::new(LogNotifier::new(MessageRenderer::new("Band News", 0))),
    );

    let (first, second) = metrics::with_local_recorder(&recorder, || {
        rt.block_on(async { (engine.run_cycle().await, engine.run_cycle().await) })
    });
    assert!(matches!(first, CycleResult::Notified { count: 3, .. }), "{first:?}");
    assert!(matches!(second, CycleResult::NoNewItems), "{second:?}");

    let out = handle.render();
    assert!(out.contains("cycle_runs_total"), "{out}");
    assert!(out.contains(r#"result="notified""#), "{out}");
    assert!(out.contains(r#"result="no_new_items""#), "{out}");
    assert!(out.contains("cycle_new_items_total"), "{out}");
    assert!(out.contains("feed_items_fetched_total"), "{out}");
    assert!(out.contains("feed_items_skipped_total"), "{out}");
    assert!(out.contains("watermark_unix_ts"), "{out}");
}

//! Feed Notifier binary entrypoint.
//! Loads configuration, wires the detection engine, then either runs a single
//! cycle (for cron / systemd timers) or keeps its own fixed-cadence scheduler.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use feed_notifier::{build_engine, scheduler, telemetry, AppConfig, CycleResult};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();

    let cfg = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Tracing is not up yet; fall back to a default subscriber for this one error.
            let _ = telemetry::init_tracing(telemetry::LogFormat::Pretty);
            tracing::error!("configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init_tracing(cfg.telemetry.log_format) {
        eprintln!("{e:#}");
    }
    if let Some(addr) = cfg.telemetry.metrics_addr {
        if let Err(e) = telemetry::install_prometheus(addr) {
            tracing::warn!("metrics disabled: {e:#}");
        }
    }

    let engine = match build_engine(&cfg) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!("startup failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if cfg.schedule.interval_secs == 0 {
        return match engine.run_cycle().await {
            CycleResult::Failed(_) => ExitCode::FAILURE,
            _ => ExitCode::SUCCESS,
        };
    }

    let interval = Duration::from_secs(cfg.schedule.interval_secs);
    tracing::info!(interval_secs = interval.as_secs(), "scheduler started");
    let handle = scheduler::spawn_scheduler(engine, interval);

    // The watermark is only written after delivery, so aborting mid-cycle is safe.
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => tracing::warn!("ctrl-c handler failed: {e}"),
    }
    handle.abort();
    ExitCode::SUCCESS
}

//! MOMENTUM — Tiered rescoring engine for tradable digital assets
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores state from disk (or creates fresh), and runs the periodic
//! tick→fetch→evaluate→persist loop with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use momentum::config::AppConfig;
use momentum::engine::RescoreScheduler;
use momentum::oracle::http::HttpScoreOracle;
use momentum::store::memory::MemoryStore;
use momentum::store::sqlite::SqliteStore;
use momentum::store::ScoreStateStore;
use momentum::types::{Clock, CycleReport, SystemClock};

const BANNER: &str = r#"
 __  __  ___  __  __ _____ _   _ _____ _   _ __  __
|  \/  |/ _ \|  \/  | ____| \ | |_   _| | | |  \/  |
| |\/| | | | | |\/| |  _| |  \| | | | | | | | |\/| |
| |  | | |_| | |  | | |___| |\  | | | | |_| | |  | |
|_|  |_|\___/|_|  |_|_____|_| \_| |_|  \___/|_|  |_|

  Tiered Rescoring Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml").unwrap_or_else(|e| {
        eprintln!("Using default configuration: {e:#}");
        AppConfig::default()
    });

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        tick_interval_secs = cfg.tracker.tick_interval_secs,
        max_batch_size = cfg.tracker.max_batch_size,
        max_in_flight = cfg.tracker.max_in_flight,
        backend = %cfg.storage.backend,
        "MOMENTUM starting up"
    );

    // -- Restore or create state -----------------------------------------

    // The memory backend keeps a concrete handle for snapshot saves.
    let (store, snapshot): (Arc<dyn ScoreStateStore>, Option<Arc<MemoryStore>>) =
        match cfg.storage.backend.as_str() {
            "sqlite" => {
                let s = Arc::new(SqliteStore::connect(&cfg.storage.database_url).await?);
                info!(url = %cfg.storage.database_url, "Using sqlite state store");
                (s as Arc<dyn ScoreStateStore>, None)
            }
            "memory" => {
                let m = Arc::new(MemoryStore::load_snapshot(&cfg.storage.snapshot_path)?);
                info!(count = m.len(), "Using in-memory state store");
                (m.clone() as Arc<dyn ScoreStateStore>, Some(m))
            }
            other => {
                warn!(backend = other, "Unknown storage backend, using memory");
                let m = Arc::new(MemoryStore::load_snapshot(&cfg.storage.snapshot_path)?);
                (m.clone() as Arc<dyn ScoreStateStore>, Some(m))
            }
        };

    // -- Initialise components -------------------------------------------

    let api_key = cfg
        .oracle
        .api_key_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok());
    if api_key.is_none() {
        warn!("No oracle API key configured — requests will be unauthenticated");
    }
    let oracle = Arc::new(HttpScoreOracle::new(&cfg.oracle, api_key)?);

    let scheduler = RescoreScheduler::from_config(oracle, store, &cfg);
    let clock = SystemClock;

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.tracker.tick_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.tracker.tick_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match scheduler.run_cycle(clock.now()).await {
                    Ok(report) => {
                        log_cycle_report(&report);
                        if let Some(ref m) = snapshot {
                            if let Err(e) = m.save_snapshot(&cfg.storage.snapshot_path) {
                                error!(error = %e, "Failed to save snapshot");
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Cycle failed — continuing to next");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // Save final state
    if let Some(ref m) = snapshot {
        m.save_snapshot(&cfg.storage.snapshot_path)?;
    }
    info!("MOMENTUM shut down cleanly.");

    Ok(())
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        selected = report.selected,
        rescored = report.rescored,
        momentum = report.momentum_events,
        tier_changes = report.tier_changes,
        died = report.died,
        retried = report.retried,
        failed = report.failed,
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("momentum=info"));

    let json_logging = std::env::var("MOMENTUM_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

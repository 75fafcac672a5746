//! Multi-cycle scheduling simulation.
//!
//! Drives the full tick→fetch→evaluate→persist loop against the
//! in-memory store and a scripted oracle, replaying several hours of
//! simulated time per test to validate cadence, momentum escalation,
//! dead-token removal, and failure recovery end to end.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use momentum::config::AppConfig;
use momentum::engine::RescoreScheduler;
use momentum::store::memory::MemoryStore;
use momentum::store::ScoreStateStore;
use momentum::types::{DeadReason, Tier, TokenMetrics, TokenRecord};

use crate::mock_oracle::ScriptedOracle;

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn metrics(score: f64, volume: Decimal, at: DateTime<Utc>) -> TokenMetrics {
    TokenMetrics {
        score,
        volume_24h_usd: volume,
        timestamp: at,
    }
}

struct Harness {
    oracle: Arc<ScriptedOracle>,
    store: Arc<MemoryStore>,
    scheduler: RescoreScheduler,
}

impl Harness {
    fn new(cfg: &AppConfig) -> Self {
        let oracle = Arc::new(ScriptedOracle::new());
        let store = Arc::new(MemoryStore::new());
        let scheduler = RescoreScheduler::from_config(oracle.clone(), store.clone(), cfg);
        Self {
            oracle,
            store,
            scheduler,
        }
    }

    async fn seed(
        &self,
        id: &str,
        score: f64,
        tier: Tier,
        volume: Decimal,
        created: DateTime<Utc>,
        due: DateTime<Utc>,
    ) {
        let record = TokenRecord::new(id, format!("0x{id}"), score, tier, volume, created, due);
        self.store.upsert(&record).await.unwrap();
    }
}

// -- Upgrade path and cadence --------------------------------------------

#[tokio::test]
async fn test_momentum_upgrade_then_high_cadence() {
    let h = Harness::new(&AppConfig::default());
    h.seed("a", 45.0, Tier::Medium, dec!(500), t0(), t0() + Duration::hours(3))
        .await;

    // Nothing is due yet an hour in.
    let report = h.scheduler.run_cycle(t0() + Duration::hours(1)).await.unwrap();
    assert_eq!(report.selected, 0);
    assert!(h.oracle.calls().is_empty());

    // At the medium cadence the score jumps past the high cutoff.
    let now = t0() + Duration::hours(3);
    h.oracle.script("0xa", metrics(72.0, dec!(300), now));
    let report = h.scheduler.run_cycle(now).await.unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.rescored, 1);
    assert_eq!(report.momentum_events, 1);
    assert_eq!(report.tier_changes, 1);

    let stored = h.store.get_record("a").await.unwrap();
    assert_eq!(stored.tier, Tier::High);
    assert_eq!(stored.current_score, 72.0);
    assert_eq!(stored.previous_score, Some(45.0));
    assert_eq!(stored.next_due_at, Some(now + Duration::hours(1)));

    // A quiet follow-up keeps the hourly high cadence.
    let now = t0() + Duration::hours(4);
    h.oracle.script("0xa", metrics(72.5, dec!(305), now));
    let report = h.scheduler.run_cycle(now).await.unwrap();
    assert_eq!(report.rescored, 1);
    assert_eq!(report.momentum_events, 0);
    assert_eq!(report.tier_changes, 0);

    let stored = h.store.get_record("a").await.unwrap();
    assert_eq!(stored.tier, Tier::High);
    assert_eq!(stored.previous_score, Some(72.0));
    assert_eq!(stored.next_due_at, Some(now + Duration::hours(1)));
}

// -- Dead-token removal --------------------------------------------------

#[tokio::test]
async fn test_dry_token_dies_after_window() {
    let h = Harness::new(&AppConfig::default());
    h.seed("dry", 50.0, Tier::Medium, dec!(0), t0(), t0() + Duration::hours(3))
        .await;
    h.oracle.script("0xdry", metrics(50.0, dec!(0), t0()));

    // Three hours of zero volume is not enough to die.
    let report = h.scheduler.run_cycle(t0() + Duration::hours(3)).await.unwrap();
    assert_eq!(report.rescored, 1);
    assert_eq!(report.died, 0);
    let stored = h.store.get_record("dry").await.unwrap();
    assert!(stored.is_active());

    // A full day of zero volume is.
    let report = h.scheduler.run_cycle(t0() + Duration::hours(24)).await.unwrap();
    assert_eq!(report.died, 1);
    let stored = h.store.get_record("dry").await.unwrap();
    assert!(!stored.is_active());
    assert_eq!(stored.dead_reason, Some(DeadReason::ZeroVolume));
    assert_eq!(stored.next_due_at, None);

    // Dead tokens never consume oracle budget again.
    let calls_before = h.oracle.calls().len();
    let report = h.scheduler.run_cycle(t0() + Duration::hours(48)).await.unwrap();
    assert_eq!(report.selected, 0);
    assert_eq!(h.oracle.calls().len(), calls_before);
}

// -- Outage, backoff, recovery -------------------------------------------

#[tokio::test]
async fn test_transient_outage_backoff_then_recovery() {
    let h = Harness::new(&AppConfig::default());
    h.seed("a", 80.0, Tier::High, dec!(500), t0(), t0() + Duration::hours(1))
        .await;
    h.oracle
        .set_error(momentum::types::OracleError::Transient("503".into()));

    // First failure reschedules with the base backoff.
    let now1 = t0() + Duration::hours(1);
    let report = h.scheduler.run_cycle(now1).await.unwrap();
    assert_eq!(report.retried, 1);
    let stored = h.store.get_record("a").await.unwrap();
    assert_eq!(stored.tier, Tier::High);
    assert_eq!(stored.next_due_at, Some(now1 + Duration::seconds(60)));

    // Second failure doubles it.
    let now2 = now1 + Duration::seconds(60);
    let report = h.scheduler.run_cycle(now2).await.unwrap();
    assert_eq!(report.retried, 1);
    let stored = h.store.get_record("a").await.unwrap();
    assert_eq!(stored.next_due_at, Some(now2 + Duration::seconds(120)));

    // The oracle recovers; the asset rescored with its tier intact.
    h.oracle.clear_error();
    let now3 = now2 + Duration::seconds(120);
    h.oracle.script("0xa", metrics(81.0, dec!(510), now3));
    let report = h.scheduler.run_cycle(now3).await.unwrap();
    assert_eq!(report.rescored, 1);
    assert_eq!(report.retried, 0);
    let stored = h.store.get_record("a").await.unwrap();
    assert_eq!(stored.tier, Tier::High);
    assert_eq!(stored.current_score, 81.0);
    assert_eq!(stored.next_due_at, Some(now3 + Duration::hours(1)));
}

#[tokio::test]
async fn test_permanent_error_removes_token() {
    let h = Harness::new(&AppConfig::default());
    h.seed("gone", 50.0, Tier::Medium, dec!(500), t0(), t0() + Duration::hours(3))
        .await;
    h.oracle
        .set_error(momentum::types::OracleError::Permanent("unknown address".into()));

    let report = h.scheduler.run_cycle(t0() + Duration::hours(3)).await.unwrap();
    assert_eq!(report.died, 1);

    let stored = h.store.get_record("gone").await.unwrap();
    assert!(!stored.is_active());
    assert_eq!(stored.dead_reason, Some(DeadReason::InvalidAddress));

    let report = h.scheduler.run_cycle(t0() + Duration::hours(6)).await.unwrap();
    assert_eq!(report.selected, 0);
}

// -- Batch limits and priority -------------------------------------------

#[tokio::test]
async fn test_batch_limit_prefers_higher_tiers() {
    let mut cfg = AppConfig::default();
    cfg.tracker.max_batch_size = 2;
    let h = Harness::new(&cfg);

    h.seed("h", 80.0, Tier::High, dec!(500), t0(), t0() + Duration::hours(1))
        .await;
    h.seed("m", 50.0, Tier::Medium, dec!(500), t0(), t0() + Duration::hours(3))
        .await;
    h.seed("l", 20.0, Tier::Low, dec!(500), t0(), t0() + Duration::hours(12))
        .await;

    let now = t0() + Duration::hours(13);
    h.oracle.script("0xh", metrics(80.5, dec!(510), now));
    h.oracle.script("0xm", metrics(50.5, dec!(510), now));
    h.oracle.script("0xl", metrics(20.5, dec!(510), now));

    // Only the two highest-priority assets fit the batch.
    let report = h.scheduler.run_cycle(now).await.unwrap();
    assert_eq!(report.selected, 2);
    assert_eq!(report.rescored, 2);
    let mut calls = h.oracle.calls();
    calls.sort();
    assert_eq!(calls, vec!["0xh", "0xm"]);

    // The starved low-tier asset is picked up next cycle.
    let report = h.scheduler.run_cycle(now + Duration::seconds(1)).await.unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.rescored, 1);
    let stored = h.store.get_record("l").await.unwrap();
    assert_eq!(stored.current_score, 20.5);
}

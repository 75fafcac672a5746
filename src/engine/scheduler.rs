//! Per-asset rescore scheduler.
//!
//! Drives the `Scheduled → Due → InFlight → Updated → Scheduled` state
//! machine for every tracked asset, with `Dead` as the absorbing state
//! and a bounded retry path on fetch failure. Each cycle it selects due
//! work in tier-priority order, dispatches oracle fetches through a
//! bounded pool, runs the evaluation chain per response, and persists
//! results under optimistic concurrency.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::oracle::ScoreOracle;
use crate::scoring::{Evaluation, EvaluationChain};
use crate::store::ScoreStateStore;
use crate::types::{
    CycleReport, DeadReason, OracleError, RescoreError, RescoreEvent, RescoreTrigger,
    TokenMetrics, TokenRecord, Tier,
};

/// Upper bound on a single backoff step, regardless of attempt count.
const MAX_BACKOFF_SECS: u64 = 3600;

/// How many optimistic-write collisions to absorb before giving up on
/// a single apply.
const MAX_CONFLICT_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Work-bounding and retry knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum records selected per tick.
    pub max_batch_size: usize,
    /// Maximum concurrent oracle fetches.
    pub max_in_flight: usize,
    /// Transient-failure retries before demotion.
    pub max_retries: u32,
    /// Base of the exponential backoff.
    pub retry_base_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            max_in_flight: 8,
            max_retries: 3,
            retry_base_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Failure outcome
// ---------------------------------------------------------------------------

/// What `record_failure` decided for a failed fetch.
#[derive(Debug)]
pub enum FailureOutcome {
    /// Rescheduled sooner with backoff, tier preserved.
    Retry {
        attempt: u32,
        next_due_at: DateTime<Utc>,
    },
    /// Retries exhausted: demoted to low tier so the asset still comes
    /// back eventually instead of starving.
    Demoted(RescoreEvent),
    /// Absorbed into the dead state (permanent oracle rejection, or the
    /// record died while the failure was being recorded).
    Dead,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Orchestrates per-asset rescoring against an injected oracle and
/// store. No global state: construct with concrete collaborators and
/// pass `now` explicitly into every operation.
pub struct RescoreScheduler {
    oracle: Arc<dyn ScoreOracle>,
    store: Arc<dyn ScoreStateStore>,
    chain: EvaluationChain,
    config: SchedulerConfig,
    /// Transient-failure counts per token, reset on success/demotion.
    attempts: Mutex<HashMap<String, u32>>,
}

impl RescoreScheduler {
    pub fn new(
        oracle: Arc<dyn ScoreOracle>,
        store: Arc<dyn ScoreStateStore>,
        chain: EvaluationChain,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            oracle,
            store,
            chain,
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Build a scheduler from application configuration.
    pub fn from_config(
        oracle: Arc<dyn ScoreOracle>,
        store: Arc<dyn ScoreStateStore>,
        cfg: &AppConfig,
    ) -> Self {
        Self::new(
            oracle,
            store,
            EvaluationChain::from_config(cfg),
            SchedulerConfig {
                max_batch_size: cfg.tracker.max_batch_size,
                max_in_flight: cfg.tracker.max_in_flight,
                max_retries: cfg.tracker.max_retries,
                retry_base_secs: cfg.tracker.retry_base_secs,
            },
        )
    }

    // -- Tick ------------------------------------------------------------

    /// Select due work for this cycle, in tier-priority order (high >
    /// medium > low), most overdue first, truncated to `limit`.
    ///
    /// Every selected record is marked in-flight in the store before it
    /// is returned, so no second fetch for the same asset can be
    /// dispatched while this one is outstanding.
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TokenRecord>, RescoreError> {
        let due = self.store.get_due_tokens(now, limit).await?;
        let mut selected = Vec::with_capacity(due.len());
        for record in due {
            match self.store.mark_in_flight(&record.id, now).await {
                Ok(()) => selected.push(record),
                Err(e) => {
                    warn!(token_id = %record.id, error = %e, "Could not mark in-flight, skipping");
                }
            }
        }
        debug!(selected = selected.len(), "Tick selection complete");
        Ok(selected)
    }

    // -- Record result ---------------------------------------------------

    /// Apply one oracle response: dead-token detection, then momentum,
    /// then tier classification, then persist.
    ///
    /// Idempotent for identical `(token_id, metrics, now)` — a
    /// duplicate apply returns an equivalent event without mutating the
    /// record. On an optimistic-write collision the record is re-read
    /// and, if still due, the evaluation is reapplied; otherwise the
    /// stale result is discarded as a no-op.
    pub async fn record_result(
        &self,
        token_id: &str,
        metrics: &TokenMetrics,
        now: DateTime<Utc>,
    ) -> Result<RescoreEvent, RescoreError> {
        self.apply(token_id, metrics, now, false).await
    }

    /// Operator-requested rescore. Same pipeline, event tagged manual.
    pub async fn record_manual(
        &self,
        token_id: &str,
        metrics: &TokenMetrics,
        now: DateTime<Utc>,
    ) -> Result<RescoreEvent, RescoreError> {
        self.apply(token_id, metrics, now, true).await
    }

    async fn apply(
        &self,
        token_id: &str,
        metrics: &TokenMetrics,
        now: DateTime<Utc>,
        manual: bool,
    ) -> Result<RescoreEvent, RescoreError> {
        for pass in 0..=MAX_CONFLICT_RETRIES {
            let record = self.store.get_record(token_id).await?;

            // Dead records only come back through external reactivation,
            // never through a late or replayed result.
            if !record.is_active() {
                debug!(%token_id, "Result for dead record, discarding");
                return Ok(Self::noop_event(&record));
            }

            // Duplicate apply: the record already reflects this exact
            // observation. Report it without writing.
            if record.last_rescored_at == now
                && record.current_score == metrics.score
                && record.volume_24h_usd == metrics.volume_24h_usd
            {
                debug!(%token_id, "Duplicate result, no-op");
                return Ok(Self::noop_event(&record));
            }

            // A conflict loser whose record is no longer due lost to a
            // concurrent apply; its event is obsolete.
            if pass > 0 && !record.is_due(now) {
                debug!(%token_id, "Record no longer due after conflict, discarding");
                return Ok(Self::noop_event(&record));
            }

            let verdict = self.chain.evaluate(&record, metrics, now)?;
            let (updated, event) = Self::transition(&record, metrics, verdict, now, manual);

            match self.store.upsert(&updated).await {
                Ok(()) => {
                    self.attempts.lock().unwrap().remove(token_id);
                    info!(
                        %token_id,
                        old_tier = %event.old_tier,
                        new_tier = %event.new_tier,
                        score = event.new_score,
                        delta_pct = format!("{:.1}%", event.delta_percent),
                        trigger = ?event.triggered_by,
                        "Rescore recorded"
                    );
                    return Ok(event);
                }
                Err(RescoreError::StaleRecord(_)) => {
                    warn!(%token_id, pass, "Stale write, re-reading");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(RescoreError::StaleRecord(token_id.to_string()))
    }

    /// Compute the updated record and event for an evaluation verdict.
    fn transition(
        record: &TokenRecord,
        metrics: &TokenMetrics,
        verdict: Evaluation,
        now: DateTime<Utc>,
        manual: bool,
    ) -> (TokenRecord, RescoreEvent) {
        let mut updated = record.clone();
        match verdict {
            Evaluation::Dead { reason } => {
                updated.volume_24h_usd = metrics.volume_24h_usd;
                updated.mark_dead(reason);
                let event = RescoreEvent {
                    id: Uuid::new_v4(),
                    token_id: record.id.clone(),
                    old_score: record.current_score,
                    new_score: metrics.score,
                    old_tier: record.tier,
                    new_tier: Tier::Dead,
                    delta_percent: (metrics.score - record.current_score)
                        / record.current_score.max(1.0)
                        * 100.0,
                    triggered_by: if manual {
                        RescoreTrigger::Manual
                    } else {
                        RescoreTrigger::Tier
                    },
                    degraded: false,
                };
                (updated, event)
            }
            Evaluation::Rescored {
                new_tier,
                signal,
                triggered_by,
                next_due_at,
                last_nonzero_volume_at,
            } => {
                updated.previous_score = Some(record.current_score);
                updated.current_score = metrics.score;
                updated.tier = new_tier;
                updated.last_rescored_at = now;
                updated.next_due_at = Some(next_due_at);
                updated.volume_24h_usd = metrics.volume_24h_usd;
                updated.last_nonzero_volume_at = last_nonzero_volume_at;
                updated.in_flight_since = None;
                let event = RescoreEvent {
                    id: Uuid::new_v4(),
                    token_id: record.id.clone(),
                    old_score: record.current_score,
                    new_score: metrics.score,
                    old_tier: record.tier,
                    new_tier,
                    delta_percent: signal.percent_change,
                    triggered_by: if manual {
                        RescoreTrigger::Manual
                    } else {
                        triggered_by
                    },
                    degraded: false,
                };
                (updated, event)
            }
        }
    }

    /// Event describing a record the apply left untouched.
    fn noop_event(record: &TokenRecord) -> RescoreEvent {
        let old_score = record.previous_score.unwrap_or(record.current_score);
        RescoreEvent {
            id: Uuid::new_v4(),
            token_id: record.id.clone(),
            old_score,
            new_score: record.current_score,
            old_tier: record.tier,
            new_tier: record.tier,
            delta_percent: (record.current_score - old_score) / old_score.max(1.0) * 100.0,
            triggered_by: RescoreTrigger::Tier,
            degraded: false,
        }
    }

    // -- Record failure --------------------------------------------------

    /// Handle a failed fetch.
    ///
    /// Transient errors reschedule sooner with bounded exponential
    /// backoff, preserving the tier, up to `max_retries`; once
    /// exhausted the asset is demoted to low tier (never marked dead)
    /// and a degraded event is emitted. Permanent errors mark the asset
    /// dead with reason invalid.
    pub async fn record_failure(
        &self,
        token_id: &str,
        error: &OracleError,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, RescoreError> {
        if !error.is_transient() {
            return self.absorb_permanent(token_id, error).await;
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(token_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if attempt > self.config.max_retries {
            self.attempts.lock().unwrap().remove(token_id);
            return self.demote(token_id, now).await;
        }

        let backoff_secs = self
            .config
            .retry_base_secs
            .saturating_mul(1u64 << (attempt - 1).min(10))
            .min(MAX_BACKOFF_SECS);
        let next_due_at = now + Duration::seconds(backoff_secs as i64);

        for _ in 0..=MAX_CONFLICT_RETRIES {
            let record = self.store.get_record(token_id).await?;
            if !record.is_active() {
                return Ok(FailureOutcome::Dead);
            }
            let mut updated = record;
            updated.next_due_at = Some(next_due_at);
            updated.in_flight_since = None;
            match self.store.upsert(&updated).await {
                Ok(()) => {
                    warn!(
                        %token_id,
                        attempt,
                        backoff_secs,
                        error = %error,
                        "Transient fetch failure, rescheduled"
                    );
                    return Ok(FailureOutcome::Retry {
                        attempt,
                        next_due_at,
                    });
                }
                Err(RescoreError::StaleRecord(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(RescoreError::StaleRecord(token_id.to_string()))
    }

    async fn absorb_permanent(
        &self,
        token_id: &str,
        error: &OracleError,
    ) -> Result<FailureOutcome, RescoreError> {
        self.attempts.lock().unwrap().remove(token_id);
        for _ in 0..=MAX_CONFLICT_RETRIES {
            let record = self.store.get_record(token_id).await?;
            if !record.is_active() {
                return Ok(FailureOutcome::Dead);
            }
            let mut updated = record;
            updated.mark_dead(DeadReason::InvalidAddress);
            match self.store.upsert(&updated).await {
                Ok(()) => {
                    error!(%token_id, error = %error, "Permanent oracle rejection, token removed from scheduling");
                    return Ok(FailureOutcome::Dead);
                }
                Err(RescoreError::StaleRecord(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(RescoreError::StaleRecord(token_id.to_string()))
    }

    async fn demote(
        &self,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, RescoreError> {
        let low_interval = self
            .chain
            .classifier()
            .interval_for(Tier::Low)
            .unwrap_or_else(|| Duration::hours(12));

        for _ in 0..=MAX_CONFLICT_RETRIES {
            let record = self.store.get_record(token_id).await?;
            if !record.is_active() {
                return Ok(FailureOutcome::Dead);
            }
            let mut updated = record.clone();
            updated.tier = Tier::Low;
            updated.next_due_at = Some(now + low_interval);
            updated.in_flight_since = None;
            match self.store.upsert(&updated).await {
                Ok(()) => {
                    let event = RescoreEvent {
                        id: Uuid::new_v4(),
                        token_id: record.id.clone(),
                        old_score: record.current_score,
                        new_score: record.current_score,
                        old_tier: record.tier,
                        new_tier: Tier::Low,
                        delta_percent: 0.0,
                        triggered_by: RescoreTrigger::Tier,
                        degraded: true,
                    };
                    warn!(
                        %token_id,
                        old_tier = %record.tier,
                        "Retries exhausted, demoted to low tier"
                    );
                    return Ok(FailureOutcome::Demoted(event));
                }
                Err(RescoreError::StaleRecord(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(RescoreError::StaleRecord(token_id.to_string()))
    }

    // -- Cycle -----------------------------------------------------------

    /// Run one full cycle: select due work, dispatch fetches through
    /// the bounded pool, apply every response. A single asset's failure
    /// never aborts the cycle; faults are isolated per asset.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, RescoreError> {
        let batch = self.tick(now, self.config.max_batch_size).await?;
        let mut report = CycleReport {
            selected: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }

        info!(
            count = batch.len(),
            max_in_flight = self.config.max_in_flight,
            "Dispatching rescore batch"
        );

        let fetches = batch.into_iter().map(|record| {
            let oracle = Arc::clone(&self.oracle);
            async move {
                let outcome = oracle.fetch_metrics(&record.address).await;
                (record, outcome)
            }
        });
        let mut results = stream::iter(fetches).buffer_unordered(self.config.max_in_flight.max(1));

        while let Some((record, outcome)) = results.next().await {
            match outcome {
                Ok(metrics) => match self.record_result(&record.id, &metrics, now).await {
                    Ok(event) => {
                        report.rescored += 1;
                        if event.new_tier == Tier::Dead {
                            report.died += 1;
                        }
                        if event.triggered_by == RescoreTrigger::Momentum {
                            report.momentum_events += 1;
                        }
                        if event.old_tier != event.new_tier {
                            report.tier_changes += 1;
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(token_id = %record.id, error = %e, "Failed to record result");
                        if let Err(e) = self.store.clear_in_flight(&record.id).await {
                            warn!(token_id = %record.id, error = %e, "Could not clear in-flight marker");
                        }
                    }
                },
                Err(oracle_err) => match self.record_failure(&record.id, &oracle_err, now).await {
                    Ok(FailureOutcome::Retry { .. }) => report.retried += 1,
                    Ok(FailureOutcome::Demoted(_)) => report.failed += 1,
                    Ok(FailureOutcome::Dead) => report.died += 1,
                    Err(e) => {
                        report.failed += 1;
                        error!(token_id = %record.id, error = %e, "Failed to record fetch failure");
                        if let Err(e) = self.store.clear_in_flight(&record.id).await {
                            warn!(token_id = %record.id, error = %e, "Could not clear in-flight marker");
                        }
                    }
                },
            }
        }

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

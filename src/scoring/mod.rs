//! Scoring pipeline — dead-token detection, momentum evaluation, and
//! tier classification.

pub mod dead;
pub mod momentum;
pub mod tier;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::AppConfig;
use crate::types::{DeadReason, RescoreError, RescoreTrigger, TokenMetrics, TokenRecord, Tier};
use dead::{DeadTokenDetector, DetectorConfig, Liveness};
use momentum::{MomentumEvaluator, MomentumSignal, Observation};
use tier::{ClassifierConfig, TierClassifier};

// ---------------------------------------------------------------------------
// Evaluation verdict
// ---------------------------------------------------------------------------

/// Outcome of running the full chain against one oracle response.
#[derive(Debug, Clone)]
pub enum Evaluation {
    /// The asset is dead; scheduling stops. Momentum and classification
    /// were short-circuited.
    Dead { reason: DeadReason },

    /// The asset stays active with a fresh tier and schedule.
    Rescored {
        new_tier: Tier,
        signal: MomentumSignal,
        triggered_by: RescoreTrigger,
        next_due_at: DateTime<Utc>,
        last_nonzero_volume_at: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// Evaluation chain
// ---------------------------------------------------------------------------

/// Pipelines dead-token detection → momentum evaluation → tier
/// classification, in that fixed order.
///
/// Instantiate once and share; every `record_result` call runs one
/// `evaluate` pass. The chain is pure with respect to the store — it
/// only reads the record and proposes the transition.
pub struct EvaluationChain {
    detector: DeadTokenDetector,
    evaluator: MomentumEvaluator,
    classifier: TierClassifier,
}

impl EvaluationChain {
    pub fn new(
        detector: DeadTokenDetector,
        evaluator: MomentumEvaluator,
        classifier: TierClassifier,
    ) -> Self {
        Self {
            detector,
            evaluator,
            classifier,
        }
    }

    /// Build the chain from application configuration.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            DeadTokenDetector::new(DetectorConfig {
                dead_token_hours: cfg.liquidity.dead_token_hours,
                min_volume_usd: cfg.liquidity.min_volume_usd,
            }),
            MomentumEvaluator::new(momentum::EvaluatorConfig {
                threshold_points: cfg.momentum.threshold_points,
                change_threshold_percent: cfg.momentum.change_threshold_percent,
            }),
            TierClassifier::new(ClassifierConfig {
                // The high cutoff sits just above the medium band's top,
                // or at the explicit upgrade threshold if that is higher.
                high_cutoff: cfg
                    .momentum
                    .upgrade_threshold
                    .max(cfg.momentum.score_range_max + 1.0),
                medium_cutoff: cfg.momentum.score_range_min,
                high_hours: cfg.tiers.high_hours,
                medium_hours: cfg.tiers.medium_hours,
                low_hours: cfg.tiers.low_hours,
            }),
        )
    }

    pub fn classifier(&self) -> &TierClassifier {
        &self.classifier
    }

    /// Run one evaluation pass for `record` against a fresh observation.
    ///
    /// Steps:
    /// 1. Liquidity check — sustained zero volume short-circuits to Dead.
    /// 2. Momentum — compare the stored observation with the new one.
    /// 3. Classification — assign the tier for the new score.
    ///
    /// Momentum that crosses a tier boundary reclassifies immediately
    /// with the new tier's interval measured from `now`. Momentum that
    /// stays within the tier escalates the schedule to the next-higher
    /// tier's interval so fast movers are not missed.
    pub fn evaluate(
        &self,
        record: &TokenRecord,
        metrics: &TokenMetrics,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, RescoreError> {
        // 1. Dead-token detection runs first and short-circuits.
        let last_nonzero_volume_at = match self.detector.assess(
            record.last_nonzero_volume_at,
            metrics.volume_24h_usd,
            now,
        ) {
            Liveness::Dead => {
                debug!(token_id = %record.id, "Liquidity window exhausted");
                return Ok(Evaluation::Dead {
                    reason: DeadReason::ZeroVolume,
                });
            }
            Liveness::Alive {
                last_nonzero_volume_at,
            } => last_nonzero_volume_at,
        };

        // 2. Momentum against the stored observation. The record always
        //    carries a prior observation (its score at discovery), so the
        //    evaluator's baseline path only applies pre-record.
        let previous = Observation {
            score: record.current_score,
            volume_24h_usd: record.volume_24h_usd,
        };
        let signal = self
            .evaluator
            .evaluate(Some(&previous), &Observation::from(metrics));

        // 3. Classification. Invalid scores surface here and fail the
        //    single asset, not the cycle.
        let new_tier = self.classifier.classify(metrics.score)?;

        let (triggered_by, interval) = if signal.detected {
            let interval = if new_tier != record.tier {
                // Boundary crossed: the new tier's cadence, from now.
                self.classifier.interval_for(new_tier)
            } else {
                // Within-tier momentum: escalate to the faster of the
                // current and next-higher tier cadence.
                let current = self.classifier.interval_for(new_tier);
                let faster = self.classifier.interval_for(new_tier.next_higher());
                match (current, faster) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            };
            (RescoreTrigger::Momentum, interval)
        } else {
            (RescoreTrigger::Tier, self.classifier.interval_for(new_tier))
        };

        // Active tiers always have an interval; Dead is unreachable here.
        let interval = interval.ok_or(RescoreError::InvalidScore(metrics.score))?;

        debug!(
            token_id = %record.id,
            old_tier = %record.tier,
            new_tier = %new_tier,
            momentum = signal.detected,
            delta = signal.score_delta,
            "Evaluation complete"
        );

        Ok(Evaluation::Rescored {
            new_tier,
            signal,
            triggered_by,
            next_due_at: now + interval,
            last_nonzero_volume_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

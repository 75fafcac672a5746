//! Momentum detection.
//!
//! Compares two consecutive observations of an asset and flags
//! significant movement: either an absolute score-point jump within one
//! rescore interval, or a percent change in any tracked metric (score
//! or 24h volume) above the configured threshold. The scheduler uses
//! the flag to escalate the rescore schedule ahead of the normal tier
//! cadence.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::TokenMetrics;

/// Momentum thresholds.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Absolute score-point delta that flags momentum.
    pub threshold_points: f64,
    /// Percent change in any tracked metric that flags momentum.
    pub change_threshold_percent: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            threshold_points: 10.0,
            change_threshold_percent: 5.0,
        }
    }
}

/// One observation of the tracked metrics, as seen by the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub score: f64,
    pub volume_24h_usd: Decimal,
}

impl From<&TokenMetrics> for Observation {
    fn from(m: &TokenMetrics) -> Self {
        Self {
            score: m.score,
            volume_24h_usd: m.volume_24h_usd,
        }
    }
}

/// Outcome of comparing two consecutive observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumSignal {
    pub detected: bool,
    /// Signed score-point delta (current − previous).
    pub score_delta: f64,
    /// Signed score percent change, computed against
    /// `max(1, previous)` to stay stable near zero.
    pub percent_change: f64,
    /// Signed volume percent change, same guard.
    pub volume_percent_change: f64,
}

impl MomentumSignal {
    /// Baseline signal for a first observation: nothing to compare yet.
    fn baseline() -> Self {
        Self {
            detected: false,
            score_delta: 0.0,
            percent_change: 0.0,
            volume_percent_change: 0.0,
        }
    }
}

/// Detects significant momentum between consecutive observations.
pub struct MomentumEvaluator {
    config: EvaluatorConfig,
}

impl MomentumEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Compare the previous observation (if any) against the current one.
    ///
    /// With no previous observation, momentum is not evaluated — the
    /// current observation simply becomes the new baseline.
    pub fn evaluate(
        &self,
        previous: Option<&Observation>,
        current: &Observation,
    ) -> MomentumSignal {
        let Some(prev) = previous else {
            return MomentumSignal::baseline();
        };

        let score_delta = current.score - prev.score;
        let percent_change = score_delta / prev.score.max(1.0) * 100.0;

        let volume_percent_change = {
            let prev_vol = prev.volume_24h_usd.max(Decimal::ONE);
            let delta = current.volume_24h_usd - prev.volume_24h_usd;
            (delta / prev_vol * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        };

        let detected = score_delta.abs() >= self.config.threshold_points
            || percent_change.abs() >= self.config.change_threshold_percent
            || volume_percent_change.abs() >= self.config.change_threshold_percent;

        MomentumSignal {
            detected,
            score_delta,
            percent_change,
            volume_percent_change,
        }
    }
}

impl Default for MomentumEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

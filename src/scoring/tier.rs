//! Tier classification.
//!
//! Pure mapping from a potential score to a rescore tier and its
//! interval. Dead is never assigned here — classification only knows
//! about score bands; liveness is the dead-token detector's job.

use chrono::Duration;

use crate::types::{RescoreError, Tier};

/// Score cutoffs and per-tier rescore intervals.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Scores at or above this are high tier.
    pub high_cutoff: f64,
    /// Scores at or above this (but below `high_cutoff`) are medium tier.
    pub medium_cutoff: f64,
    pub high_hours: i64,
    pub medium_hours: i64,
    pub low_hours: i64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            high_cutoff: 70.0,
            medium_cutoff: 40.0,
            high_hours: 1,
            medium_hours: 3,
            low_hours: 12,
        }
    }
}

/// Deterministic score → tier mapping.
pub struct TierClassifier {
    config: ClassifierConfig,
}

impl TierClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify a score into a tier.
    ///
    /// Total for all finite non-negative scores; rejects negative and
    /// non-finite input with `InvalidScore`.
    pub fn classify(&self, score: f64) -> Result<Tier, RescoreError> {
        if !score.is_finite() || score < 0.0 {
            return Err(RescoreError::InvalidScore(score));
        }

        if score >= self.config.high_cutoff {
            Ok(Tier::High)
        } else if score >= self.config.medium_cutoff {
            Ok(Tier::Medium)
        } else {
            Ok(Tier::Low)
        }
    }

    /// Rescore interval for a tier. `None` means scheduling is paused.
    pub fn interval_for(&self, tier: Tier) -> Option<Duration> {
        match tier {
            Tier::High => Some(Duration::hours(self.config.high_hours)),
            Tier::Medium => Some(Duration::hours(self.config.medium_hours)),
            Tier::Low => Some(Duration::hours(self.config.low_hours)),
            Tier::Dead => None,
        }
    }
}

impl Default for TierClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Dead-token detection.
//!
//! Tracks sustained zero liquidity. An asset whose 24h volume stays
//! below the floor for the full dead-token window is removed from
//! scheduling entirely. Runs first in the evaluation chain and
//! short-circuits momentum and tier classification.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Liquidity floor and dead-token window.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Hours of sustained sub-floor volume before marking dead.
    pub dead_token_hours: i64,
    /// Minimum 24h USD volume to count as liquid.
    pub min_volume_usd: Decimal,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            dead_token_hours: 24,
            min_volume_usd: Decimal::ONE_HUNDRED,
        }
    }
}

/// Verdict of one liquidity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Still scheduled. Carries the (possibly refreshed) timestamp of
    /// the last observation with volume at or above the floor.
    Alive {
        last_nonzero_volume_at: DateTime<Utc>,
    },
    /// Sustained zero liquidity for the full window.
    Dead,
}

/// Detects assets that have gone illiquid for the full dead window.
pub struct DeadTokenDetector {
    config: DetectorConfig,
}

impl DeadTokenDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Evaluate one observation.
    ///
    /// Volume at or above the floor refreshes `last_nonzero_volume_at`
    /// to `now`. Below the floor, the timestamp is left unchanged and
    /// the asset dies once the window has fully elapsed.
    pub fn assess(
        &self,
        last_nonzero_volume_at: DateTime<Utc>,
        volume_24h_usd: Decimal,
        now: DateTime<Utc>,
    ) -> Liveness {
        if volume_24h_usd >= self.config.min_volume_usd {
            return Liveness::Alive {
                last_nonzero_volume_at: now,
            };
        }

        let window = Duration::hours(self.config.dead_token_hours);
        if now - last_nonzero_volume_at >= window {
            Liveness::Dead
        } else {
            Liveness::Alive {
                last_nonzero_volume_at,
            }
        }
    }
}

impl Default for DeadTokenDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

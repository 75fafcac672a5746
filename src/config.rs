//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`. Thresholds are loaded once
//! at process start and treated as immutable for the process lifetime.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub tiers: TiersConfig,
    pub momentum: MomentumConfig,
    pub liquidity: LiquidityConfig,
    pub oracle: OracleConfig,
    pub storage: StorageConfig,
}

/// Coordinator cadence and work-bounding knobs.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds between coordinator ticks.
    pub tick_interval_secs: u64,
    /// Maximum records selected per tick (starvation bound).
    pub max_batch_size: usize,
    /// Maximum concurrent oracle fetches (backpressure knob).
    pub max_in_flight: usize,
    /// Transient-failure retries before demoting to low tier.
    pub max_retries: u32,
    /// Base of the exponential backoff applied on transient failure.
    pub retry_base_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            max_batch_size: 50,
            max_in_flight: 8,
            max_retries: 3,
            retry_base_secs: 60,
        }
    }
}

/// Rescore intervals per tier, in hours.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TiersConfig {
    pub high_hours: i64,
    pub medium_hours: i64,
    pub low_hours: i64,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            high_hours: 1,
            medium_hours: 3,
            low_hours: 12,
        }
    }
}

/// Momentum detection thresholds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MomentumConfig {
    /// Absolute score-point delta that flags momentum within one interval.
    pub threshold_points: f64,
    /// Score band where momentum watching matters most (informational
    /// band from the original product tuning; kept as recognized knobs).
    pub score_range_min: f64,
    pub score_range_max: f64,
    /// Score at which an asset is promoted to the high tier.
    pub upgrade_threshold: f64,
    /// Percent change in any tracked metric that flags momentum.
    pub change_threshold_percent: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            threshold_points: 10.0,
            score_range_min: 40.0,
            score_range_max: 69.0,
            upgrade_threshold: 70.0,
            change_threshold_percent: 5.0,
        }
    }
}

/// Dead-token detection knobs.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LiquidityConfig {
    /// Hours of sustained sub-floor volume before marking dead.
    pub dead_token_hours: i64,
    /// Minimum 24h USD volume to count as liquid.
    pub min_volume_usd: Decimal,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            dead_token_hours: 24,
            min_volume_usd: dec!(100),
        }
    }
}

/// Score oracle endpoint settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    /// Name of the env var holding the API key (resolved at runtime).
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key_env: None,
            timeout_secs: 10,
        }
    }
}

/// Persistence backend selection.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// "memory" or "sqlite".
    pub backend: String,
    /// SQLite connection string, e.g. `sqlite://momentum.db`.
    pub database_url: String,
    /// JSON snapshot path used by the memory backend.
    pub snapshot_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            database_url: "sqlite://momentum.db?mode=rwc".to_string(),
            snapshot_path: "momentum_state.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

//! Score oracle integrations.
//!
//! Defines the `ScoreOracle` trait — the expensive external scoring
//! computation the engine is built to call as rarely as possible — and
//! provides the HTTP client implementation used by the binary.

pub mod http;

use async_trait::async_trait;

use crate::types::{OracleError, TokenMetrics};

/// Abstraction over the external score computation.
///
/// Implementors compute a fresh potential score and liquidity metrics
/// for an asset address. Failures are split into transient (retry with
/// backoff) and permanent (the address will never score).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoreOracle: Send + Sync {
    /// Compute fresh metrics for an asset.
    async fn fetch_metrics(&self, address: &str) -> Result<TokenMetrics, OracleError>;

    /// Oracle name for logging and identification.
    fn name(&self) -> &str;
}

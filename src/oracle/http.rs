//! HTTP score oracle client.
//!
//! Calls the external scoring service over HTTP/JSON:
//! `GET {base_url}/v1/scores/{address}` with optional bearer auth.
//! Rate limits, timeouts, and upstream 5xx map to transient errors;
//! client errors (unknown or malformed address) are permanent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::ScoreOracle;
use crate::config::OracleConfig;
use crate::types::{OracleError, TokenMetrics};

const ORACLE_NAME: &str = "http-score-oracle";

// ---------------------------------------------------------------------------
// API response types (scoring service JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreResponse {
    score: f64,
    #[serde(default)]
    volume24h_usd: f64,
    /// Milliseconds since epoch.
    timestamp: i64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Reqwest-backed `ScoreOracle` implementation.
pub struct HttpScoreOracle {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpScoreOracle {
    /// Build a client from config. The API key, if configured, is
    /// resolved from the env var named in `api_key_env` by the caller.
    pub fn new(config: &OracleConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn classify_status(status: StatusCode) -> Option<OracleError> {
        if status.is_success() {
            return None;
        }
        let err = if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            OracleError::Transient(format!("scoring service returned {status}"))
        } else {
            OracleError::Permanent(format!("scoring service returned {status}"))
        };
        Some(err)
    }

    fn into_metrics(dto: ScoreResponse) -> Result<TokenMetrics, OracleError> {
        let volume_24h_usd = Decimal::from_f64_retain(dto.volume24h_usd)
            .ok_or_else(|| {
                OracleError::Permanent(format!("unrepresentable volume: {}", dto.volume24h_usd))
            })?;
        let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(dto.timestamp)
            .ok_or_else(|| {
                OracleError::Permanent(format!("unrepresentable timestamp: {}", dto.timestamp))
            })?;
        Ok(TokenMetrics {
            score: dto.score,
            volume_24h_usd,
            timestamp,
        })
    }
}

#[async_trait]
impl ScoreOracle for HttpScoreOracle {
    async fn fetch_metrics(&self, address: &str) -> Result<TokenMetrics, OracleError> {
        let url = format!("{}/v1/scores/{address}", self.base_url);
        debug!(%address, "Fetching score metrics");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            // Network-level failures are retryable by definition.
            warn!(%address, error = %e, "Oracle request failed");
            OracleError::Transient(e.to_string())
        })?;

        if let Some(err) = Self::classify_status(response.status()) {
            warn!(%address, error = %err, "Oracle rejected request");
            return Err(err);
        }

        let dto: ScoreResponse = response.json().await.map_err(|e| {
            OracleError::Permanent(format!("malformed scoring response: {e}"))
        })?;

        Self::into_metrics(dto)
    }

    fn name(&self) -> &str {
        ORACLE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

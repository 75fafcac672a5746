//! Mock score oracle for integration testing.
//!
//! Provides a deterministic `ScoreOracle` implementation that returns
//! scripted metrics per address and tracks every call — all in-memory
//! with no external dependencies.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use momentum::oracle::ScoreOracle;
use momentum::types::{OracleError, TokenMetrics};

/// A mock oracle for deterministic testing.
///
/// Responses are queued per address; the last queued response repeats
/// once the queue drains. All state is controllable from test code.
pub struct ScriptedOracle {
    name: String,
    responses: Arc<Mutex<HashMap<String, VecDeque<TokenMetrics>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    /// If set, all fetches return this error.
    force_error: Arc<Mutex<Option<OracleError>>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue a response for an address.
    pub fn script(&self, address: &str, metrics: TokenMetrics) {
        self.responses
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push_back(metrics);
    }

    /// Force all subsequent fetches to return an error.
    pub fn set_error(&self, error: OracleError) {
        *self.force_error.lock().unwrap() = Some(error);
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Addresses fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScoreOracle for ScriptedOracle {
    async fn fetch_metrics(&self, address: &str) -> Result<TokenMetrics, OracleError> {
        self.calls.lock().unwrap().push(address.to_string());

        if let Some(err) = self.force_error.lock().unwrap().clone() {
            return Err(err);
        }

        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .get_mut(address)
            .ok_or_else(|| OracleError::Permanent(format!("unscripted address: {address}")))?;
        if queue.is_empty() {
            return Err(OracleError::Permanent(format!(
                "unscripted address: {address}"
            )));
        }
        // The final scripted response repeats.
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().unwrap().clone())
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

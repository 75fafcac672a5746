//! In-memory state store with JSON snapshot persistence.
//!
//! Default backend for development and the integration test harness.
//! All records live in a mutex-guarded map; `save_snapshot` /
//! `load_snapshot` persist them to a JSON file between runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::{in_flight_cutoff, order_due, ScoreStateStore};
use crate::types::{RescoreError, TokenRecord};

/// Mutex-guarded map of records, keyed by token id.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, TokenRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from existing records (snapshot restore, tests).
    pub fn with_records(records: Vec<TokenRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: Mutex::new(map),
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Save all records to a JSON snapshot file.
    pub fn save_snapshot(&self, path: &str) -> Result<()> {
        let mut records: Vec<TokenRecord> =
            self.records.lock().unwrap().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let json = serde_json::to_string_pretty(&records)
            .context("Failed to serialise token records")?;
        std::fs::write(path, &json)
            .context(format!("Failed to write snapshot to {path}"))?;

        debug!(path, count = records.len(), "Snapshot saved");
        Ok(())
    }

    /// Load a store from a JSON snapshot file.
    /// Returns an empty store if the file doesn't exist (fresh start).
    pub fn load_snapshot(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!(path, "No snapshot found, starting fresh");
            return Ok(Self::new());
        }

        let json = std::fs::read_to_string(path)
            .context(format!("Failed to read snapshot from {path}"))?;
        let records: Vec<TokenRecord> = serde_json::from_str(&json)
            .context(format!("Failed to parse snapshot from {path}"))?;

        info!(path, count = records.len(), "Snapshot loaded from disk");
        Ok(Self::with_records(records))
    }
}

#[async_trait]
impl ScoreStateStore for MemoryStore {
    async fn get_due_tokens(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TokenRecord>, RescoreError> {
        let cutoff = in_flight_cutoff(now);
        let mut due: Vec<TokenRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_due(now))
            .filter(|r| r.in_flight_since.map(|t| t <= cutoff).unwrap_or(true))
            .cloned()
            .collect();

        order_due(&mut due);
        due.truncate(limit);
        Ok(due)
    }

    async fn upsert(&self, record: &TokenRecord) -> Result<(), RescoreError> {
        let mut records = self.records.lock().unwrap();
        if let Some(stored) = records.get(&record.id) {
            if stored.version != record.version {
                return Err(RescoreError::StaleRecord(record.id.clone()));
            }
        }
        let mut next = record.clone();
        next.version += 1;
        records.insert(next.id.clone(), next);
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<TokenRecord, RescoreError> {
        self.records
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RescoreError::NotFound(id.to_string()))
    }

    async fn mark_in_flight(&self, id: &str, now: DateTime<Utc>) -> Result<(), RescoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(id)
            .ok_or_else(|| RescoreError::NotFound(id.to_string()))?;
        record.in_flight_since = Some(now);
        Ok(())
    }

    async fn clear_in_flight(&self, id: &str) -> Result<(), RescoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(id)
            .ok_or_else(|| RescoreError::NotFound(id.to_string()))?;
        record.in_flight_since = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

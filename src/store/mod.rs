//! Persistence layer.
//!
//! Defines the `ScoreStateStore` contract the scheduler writes through,
//! plus two implementations: an in-memory store with JSON snapshot
//! persistence, and a SQLite store for durable deployments.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::types::{RescoreError, TokenRecord};

/// In-flight markers older than this are treated as abandoned (process
/// died mid-fetch) and the record becomes selectable again.
pub const IN_FLIGHT_TTL_MINUTES: i64 = 10;

/// Cutoff before which an in-flight marker no longer blocks selection.
pub fn in_flight_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::minutes(IN_FLIGHT_TTL_MINUTES)
}

/// Durable per-asset state store.
///
/// Writes are optimistically versioned: `upsert` succeeds only when the
/// caller's `version` matches the stored one, and bumps it on success.
/// The in-flight marker methods deliberately do not touch the version —
/// the marker is scheduler bookkeeping, not evaluation state, and must
/// not invalidate a read taken just before dispatch.
#[async_trait]
pub trait ScoreStateStore: Send + Sync {
    /// Active records with `next_due_at <= now`, excluding records with
    /// a live in-flight marker, ordered by tier priority (high first)
    /// then by how overdue they are (most overdue first), truncated to
    /// `limit`. Dead records never appear.
    async fn get_due_tokens(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TokenRecord>, RescoreError>;

    /// Insert or update a record. Fails with `StaleRecord` when the
    /// stored version no longer matches `record.version`.
    async fn upsert(&self, record: &TokenRecord) -> Result<(), RescoreError>;

    /// Fetch one record by id.
    async fn get_record(&self, id: &str) -> Result<TokenRecord, RescoreError>;

    /// Set the per-asset in-flight marker (fetch dispatched).
    async fn mark_in_flight(&self, id: &str, now: DateTime<Utc>) -> Result<(), RescoreError>;

    /// Clear the per-asset in-flight marker.
    async fn clear_in_flight(&self, id: &str) -> Result<(), RescoreError>;
}

/// Shared due-selection ordering: tier priority, then earliest deadline
/// (i.e. most overdue) first, then id so equal deadlines select in a
/// stable order.
pub(crate) fn order_due(records: &mut [TokenRecord]) {
    records.sort_by(|a, b| {
        a.tier
            .priority()
            .cmp(&b.tier.priority())
            .then(a.next_due_at.cmp(&b.next_due_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

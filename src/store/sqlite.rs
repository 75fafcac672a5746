//! SQLite state store.
//!
//! Durable backend for deployments that outlive a process restart.
//! Timestamps are stored as RFC3339 TEXT (lexicographically comparable
//! in UTC), USD volumes as TEXT-encoded decimals to avoid float drift.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use super::{in_flight_cutoff, ScoreStateStore};
use crate::types::{DeadReason, RescoreError, Tier, TokenRecord, TokenStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tokens (
    id                     TEXT PRIMARY KEY,
    address                TEXT NOT NULL,
    current_score          REAL NOT NULL,
    previous_score         REAL,
    tier                   TEXT NOT NULL,
    status                 TEXT NOT NULL,
    dead_reason            TEXT,
    last_rescored_at       TEXT NOT NULL,
    next_due_at            TEXT,
    volume_24h_usd         TEXT NOT NULL,
    last_nonzero_volume_at TEXT NOT NULL,
    in_flight_since        TEXT,
    version                INTEGER NOT NULL
)
"#;

/// SQLite-backed `ScoreStateStore`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and ensure the schema exists.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        // A shared in-memory database only exists on one connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        info!(url, "SQLite store ready");
        Ok(Self { pool })
    }
}

// -- Row mapping helpers ----------------------------------------------------

fn persist(e: sqlx::Error) -> RescoreError {
    RescoreError::Persistence(e.to_string())
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, RescoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RescoreError::Persistence(format!("bad timestamp '{s}': {e}")))
}

fn dead_reason_str(reason: DeadReason) -> &'static str {
    match reason {
        DeadReason::ZeroVolume => "zero_volume",
        DeadReason::InvalidAddress => "invalid_address",
    }
}

fn parse_dead_reason(s: &str) -> Result<DeadReason, RescoreError> {
    match s {
        "zero_volume" => Ok(DeadReason::ZeroVolume),
        "invalid_address" => Ok(DeadReason::InvalidAddress),
        other => Err(RescoreError::Persistence(format!("bad dead_reason '{other}'"))),
    }
}

fn row_to_record(row: &SqliteRow) -> Result<TokenRecord, RescoreError> {
    let tier: String = row.try_get("tier").map_err(persist)?;
    let status: String = row.try_get("status").map_err(persist)?;
    let dead_reason: Option<String> = row.try_get("dead_reason").map_err(persist)?;
    let last_rescored_at: String = row.try_get("last_rescored_at").map_err(persist)?;
    let next_due_at: Option<String> = row.try_get("next_due_at").map_err(persist)?;
    let volume: String = row.try_get("volume_24h_usd").map_err(persist)?;
    let last_nonzero: String = row.try_get("last_nonzero_volume_at").map_err(persist)?;
    let in_flight_since: Option<String> = row.try_get("in_flight_since").map_err(persist)?;

    Ok(TokenRecord {
        id: row.try_get("id").map_err(persist)?,
        address: row.try_get("address").map_err(persist)?,
        current_score: row.try_get("current_score").map_err(persist)?,
        previous_score: row.try_get("previous_score").map_err(persist)?,
        tier: Tier::from_str(&tier).map_err(RescoreError::Persistence)?,
        status: TokenStatus::from_str(&status).map_err(RescoreError::Persistence)?,
        dead_reason: dead_reason.as_deref().map(parse_dead_reason).transpose()?,
        last_rescored_at: parse_ts(&last_rescored_at)?,
        next_due_at: next_due_at.as_deref().map(parse_ts).transpose()?,
        volume_24h_usd: Decimal::from_str(&volume)
            .map_err(|e| RescoreError::Persistence(format!("bad volume '{volume}': {e}")))?,
        last_nonzero_volume_at: parse_ts(&last_nonzero)?,
        in_flight_since: in_flight_since.as_deref().map(parse_ts).transpose()?,
        version: row.try_get("version").map_err(persist)?,
    })
}

#[async_trait]
impl ScoreStateStore for SqliteStore {
    async fn get_due_tokens(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TokenRecord>, RescoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tokens
            WHERE status = 'active'
              AND next_due_at IS NOT NULL
              AND next_due_at <= ?1
              AND (in_flight_since IS NULL OR in_flight_since <= ?2)
            ORDER BY
              CASE tier WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
              next_due_at ASC,
              id ASC
            LIMIT ?3
            "#,
        )
        .bind(ts(now))
        .bind(ts(in_flight_cutoff(now)))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(persist)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn upsert(&self, record: &TokenRecord) -> Result<(), RescoreError> {
        let mut tx = self.pool.begin().await.map_err(persist)?;

        let stored_version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM tokens WHERE id = ?1")
                .bind(&record.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(persist)?;

        match stored_version {
            Some(v) if v != record.version => {
                return Err(RescoreError::StaleRecord(record.id.clone()));
            }
            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE tokens SET
                      address = ?2, current_score = ?3, previous_score = ?4,
                      tier = ?5, status = ?6, dead_reason = ?7,
                      last_rescored_at = ?8, next_due_at = ?9,
                      volume_24h_usd = ?10, last_nonzero_volume_at = ?11,
                      in_flight_since = ?12, version = ?13
                    WHERE id = ?1
                    "#,
                )
                .bind(&record.id)
                .bind(&record.address)
                .bind(record.current_score)
                .bind(record.previous_score)
                .bind(record.tier.to_string())
                .bind(record.status.to_string())
                .bind(record.dead_reason.map(dead_reason_str))
                .bind(ts(record.last_rescored_at))
                .bind(record.next_due_at.map(ts))
                .bind(record.volume_24h_usd.to_string())
                .bind(ts(record.last_nonzero_volume_at))
                .bind(record.in_flight_since.map(ts))
                .bind(record.version + 1)
                .execute(&mut *tx)
                .await
                .map_err(persist)?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO tokens (
                      id, address, current_score, previous_score,
                      tier, status, dead_reason,
                      last_rescored_at, next_due_at,
                      volume_24h_usd, last_nonzero_volume_at,
                      in_flight_since, version
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    "#,
                )
                .bind(&record.id)
                .bind(&record.address)
                .bind(record.current_score)
                .bind(record.previous_score)
                .bind(record.tier.to_string())
                .bind(record.status.to_string())
                .bind(record.dead_reason.map(dead_reason_str))
                .bind(ts(record.last_rescored_at))
                .bind(record.next_due_at.map(ts))
                .bind(record.volume_24h_usd.to_string())
                .bind(ts(record.last_nonzero_volume_at))
                .bind(record.in_flight_since.map(ts))
                .bind(record.version + 1)
                .execute(&mut *tx)
                .await
                .map_err(persist)?;
            }
        }

        tx.commit().await.map_err(persist)
    }

    async fn get_record(&self, id: &str) -> Result<TokenRecord, RescoreError> {
        let row = sqlx::query("SELECT * FROM tokens WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(persist)?
            .ok_or_else(|| RescoreError::NotFound(id.to_string()))?;
        row_to_record(&row)
    }

    async fn mark_in_flight(&self, id: &str, now: DateTime<Utc>) -> Result<(), RescoreError> {
        let result = sqlx::query("UPDATE tokens SET in_flight_since = ?2 WHERE id = ?1")
            .bind(id)
            .bind(ts(now))
            .execute(&self.pool)
            .await
            .map_err(persist)?;
        if result.rows_affected() == 0 {
            return Err(RescoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn clear_in_flight(&self, id: &str) -> Result<(), RescoreError> {
        let result = sqlx::query("UPDATE tokens SET in_flight_since = NULL WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(persist)?;
        if result.rows_affected() == 0 {
            return Err(RescoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

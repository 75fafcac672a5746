//! Core data types shared across the MOMENTUM engine.
//!
//! Defines the per-asset record tracked by the scheduler, the metrics
//! payload returned by the score oracle, the ephemeral rescore event
//! emitted per evaluation, per-cycle reporting, the injected clock
//! capability, and the domain error taxonomy.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Rescoring priority class derived from an asset's score band.
///
/// `Dead` is never assigned by score alone — only the dead-token
/// detector (or a permanent oracle failure) moves an asset there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
    Dead,
}

impl Tier {
    /// Selection priority for due-work ordering. Lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            Tier::High => 0,
            Tier::Medium => 1,
            Tier::Low => 2,
            Tier::Dead => 3,
        }
    }

    /// The next-faster tier, used for within-tier momentum escalation.
    /// High escalates to itself (there is nothing faster).
    pub fn next_higher(&self) -> Tier {
        match self {
            Tier::High => Tier::High,
            Tier::Medium => Tier::High,
            Tier::Low => Tier::Medium,
            Tier::Dead => Tier::Dead,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
            Tier::Dead => "dead",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Tier::High),
            "medium" => Ok(Tier::Medium),
            "low" => Ok(Tier::Low),
            "dead" => Ok(Tier::Dead),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Token status
// ---------------------------------------------------------------------------

/// Whether an asset participates in scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Dead,
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStatus::Active => write!(f, "active"),
            TokenStatus::Dead => write!(f, "dead"),
        }
    }
}

impl FromStr for TokenStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(TokenStatus::Active),
            "dead" => Ok(TokenStatus::Dead),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Why an asset was marked dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadReason {
    /// 24h volume stayed below the liquidity floor for the full window.
    ZeroVolume,
    /// The oracle rejected the address permanently.
    InvalidAddress,
}

impl fmt::Display for DeadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadReason::ZeroVolume => write!(f, "zero_volume"),
            DeadReason::InvalidAddress => write!(f, "invalid_address"),
        }
    }
}

// ---------------------------------------------------------------------------
// Token record
// ---------------------------------------------------------------------------

/// Durable per-asset state. One record per tracked asset.
///
/// Invariants maintained by the scheduler:
/// - active ⇒ `next_due_at` is `Some` and equals `last_rescored_at`
///   plus the effective rescore interval for the record's tier;
/// - `status == Dead` ⇒ `tier == Dead` and `next_due_at == None`;
/// - `version` increments on every successful store write (optimistic
///   concurrency).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: String,
    pub address: String,
    pub current_score: f64,
    pub previous_score: Option<f64>,
    pub tier: Tier,
    pub status: TokenStatus,
    pub dead_reason: Option<DeadReason>,
    pub last_rescored_at: DateTime<Utc>,
    /// Absent iff the record is dead.
    pub next_due_at: Option<DateTime<Utc>>,
    pub volume_24h_usd: Decimal,
    pub last_nonzero_volume_at: DateTime<Utc>,
    /// Per-asset in-flight marker. Set when a fetch is dispatched,
    /// cleared when the result (or failure) is recorded.
    pub in_flight_since: Option<DateTime<Utc>>,
    pub version: i64,
}

impl TokenRecord {
    /// Create a freshly-discovered record, scheduled for `next_due_at`.
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        score: f64,
        tier: Tier,
        volume_24h_usd: Decimal,
        now: DateTime<Utc>,
        next_due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            current_score: score,
            previous_score: None,
            tier,
            status: TokenStatus::Active,
            dead_reason: None,
            last_rescored_at: now,
            next_due_at: Some(next_due_at),
            volume_24h_usd,
            last_nonzero_volume_at: now,
            in_flight_since: None,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TokenStatus::Active
    }

    /// Whether the record's rescore time has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.next_due_at.map(|t| t <= now).unwrap_or(false)
    }

    /// How far past its schedule the record is. Zero when not due.
    pub fn overdue_by(&self, now: DateTime<Utc>) -> chrono::Duration {
        match self.next_due_at {
            Some(due) if due <= now => now - due,
            _ => chrono::Duration::zero(),
        }
    }

    /// Transition to the absorbing dead state.
    pub fn mark_dead(&mut self, reason: DeadReason) {
        self.tier = Tier::Dead;
        self.status = TokenStatus::Dead;
        self.dead_reason = Some(reason);
        self.next_due_at = None;
        self.in_flight_since = None;
    }
}

// ---------------------------------------------------------------------------
// Oracle metrics
// ---------------------------------------------------------------------------

/// One fresh observation from the score oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub score: f64,
    pub volume_24h_usd: Decimal,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Rescore event
// ---------------------------------------------------------------------------

/// What prompted a rescore evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RescoreTrigger {
    /// Normal tier-schedule expiry.
    Tier,
    /// Momentum detection overrode the normal schedule.
    Momentum,
    /// Operator-requested rescore.
    Manual,
}

/// Result of one evaluation pass. Ephemeral — logged, never persisted
/// by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescoreEvent {
    pub id: Uuid,
    pub token_id: String,
    pub old_score: f64,
    pub new_score: f64,
    pub old_tier: Tier,
    pub new_tier: Tier,
    pub delta_percent: f64,
    pub triggered_by: RescoreTrigger,
    /// Set when the event came from the retries-exhausted demotion path.
    pub degraded: bool,
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of a single tick→fetch→evaluate→persist cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub selected: usize,
    pub rescored: usize,
    pub momentum_events: usize,
    pub tier_changes: usize,
    pub died: usize,
    pub retried: usize,
    pub failed: usize,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "selected={} rescored={} momentum={} tier_changes={} died={} retried={} failed={}",
            self.selected,
            self.rescored,
            self.momentum_events,
            self.tier_changes,
            self.died,
            self.retried,
            self.failed,
        )
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Injected time source. The coordinator reads the clock once per cycle
/// and passes `now` explicitly into `tick` / `record_result`, keeping
/// time-dependent behavior deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used by the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures reported by the score oracle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    /// Retryable: timeouts, rate limits, upstream 5xx.
    #[error("transient oracle error: {0}")]
    Transient(String),

    /// Not retryable: bad address, gone asset, malformed request.
    #[error("permanent oracle error: {0}")]
    Permanent(String),
}

impl OracleError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Transient(_))
    }
}

/// Domain errors for the rescoring core.
#[derive(Debug, thiserror::Error)]
pub enum RescoreError {
    /// Score was negative or not a finite number.
    #[error("invalid score: {0}")]
    InvalidScore(f64),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("persistence error: {0}")]
    Persistence(String),

    /// Optimistic-write collision: the stored record moved on.
    #[error("stale write for token {0}")]
    StaleRecord(String),

    #[error("token not found: {0}")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Append-only audit streams for the decision core.
//!
//! Every record carries a UTC timestamp, the source component, and a
//! correlation id so one decision loop can be reconstructed across streams.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use verdict_core::{
    ExecutionFlag, ExecutionReport, LifecycleStatus, OrderId, RiskEventType, RiskLevel, Side,
    StrategyId, SystemState, UserId, WitnessTier,
};

/// Result alias for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Journal-specific error type.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// State machine transition attempt (accepted or rejected).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StateTransitionRecord {
    pub from: SystemState,
    pub to: SystemState,
    pub accepted: bool,
    pub reason: String,
    pub actor: String,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// One risk event emitted by a domain checker.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RiskEventRecord {
    pub event_type: RiskEventType,
    pub level: RiskLevel,
    pub description: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// An order the executor handed to an exchange client.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct OrderRecord {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: Option<f64>,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Settled per-user execution outcome.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub report: ExecutionReport,
    pub correlation_id: Uuid,
}

impl ExecutionRecord {
    #[must_use]
    pub fn flags(&self) -> &BTreeSet<ExecutionFlag> {
        &self.report.flags
    }
}

/// Realized profit attributed to one user.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct UserProfitRecord {
    pub user_id: UserId,
    pub pnl: f64,
    pub equity_after: Option<f64>,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Audited change of a weight component.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WeightChangeRecord {
    pub strategy_id: StrategyId,
    pub field: String,
    pub previous: f64,
    pub requested: f64,
    pub applied: f64,
    pub actor: String,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Audited strategy lifecycle change.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LifecycleChangeRecord {
    pub strategy_id: StrategyId,
    pub from: Option<LifecycleStatus>,
    pub to: LifecycleStatus,
    pub tier: Option<WitnessTier>,
    pub reason: String,
    pub actor: String,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Union of all auditable events, tagged with its logical stream.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    StateTransition(StateTransitionRecord),
    RiskEvent(RiskEventRecord),
    Order(OrderRecord),
    Execution(ExecutionRecord),
    UserProfit(UserProfitRecord),
    WeightChange(WeightChangeRecord),
    LifecycleChange(LifecycleChangeRecord),
}

impl AuditEvent {
    /// Logical stream name the event belongs to.
    #[must_use]
    pub fn stream(&self) -> &'static str {
        match self {
            Self::StateTransition(_) => "state_transitions",
            Self::RiskEvent(_) => "risk_events",
            Self::Order(_) => "orders",
            Self::Execution(_) => "executions",
            Self::UserProfit(_) => "user_profits",
            Self::WeightChange(_) => "weight_changes",
            Self::LifecycleChange(_) => "lifecycle_changes",
        }
    }

    /// Correlation id linking the event to one decision loop.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        match self {
            Self::StateTransition(r) => r.correlation_id,
            Self::RiskEvent(r) => r.correlation_id,
            Self::Order(r) => r.correlation_id,
            Self::Execution(r) => r.correlation_id,
            Self::UserProfit(r) => r.correlation_id,
            Self::WeightChange(r) => r.correlation_id,
            Self::LifecycleChange(r) => r.correlation_id,
        }
    }

    /// Event timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StateTransition(r) => r.timestamp,
            Self::RiskEvent(r) => r.timestamp,
            Self::Order(r) => r.timestamp,
            Self::Execution(r) => r.report.timestamp,
            Self::UserProfit(r) => r.timestamp,
            Self::WeightChange(r) => r.timestamp,
            Self::LifecycleChange(r) => r.timestamp,
        }
    }
}

/// Abstraction over append-only audit storage. Single writer per stream.
pub trait Journal: Send + Sync {
    /// Append one event to its stream. Never mutates prior records.
    fn append(&self, component: &str, event: &AuditEvent) -> JournalResult<()>;
}

/// In-memory journal used in tests and as a null sink.
#[derive(Default)]
pub struct MemoryJournal {
    events: Mutex<Vec<(String, AuditEvent)>>,
}

impl MemoryJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all appended events in order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, AuditEvent)> {
        self.events.lock().expect("journal poisoned").clone()
    }

    /// Events appended to one logical stream.
    #[must_use]
    pub fn stream(&self, stream: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .expect("journal poisoned")
            .iter()
            .filter(|(_, event)| event.stream() == stream)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, component: &str, event: &AuditEvent) -> JournalResult<()> {
        self.events
            .lock()
            .expect("journal poisoned")
            .push((component.to_string(), event.clone()));
        Ok(())
    }
}

const AUDIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stream TEXT NOT NULL,
    component TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_stream ON audit_log (stream, recorded_at);
"#;

/// [`Journal`] implementation backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteJournal {
    path: PathBuf,
}

impl SqliteJournal {
    /// Create a journal that appends into the provided file path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn connect(&self) -> JournalResult<Connection> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                JournalError::Storage(format!(
                    "failed to create journal directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(&self.path).map_err(|err| {
            JournalError::Storage(format!(
                "failed to open journal database {}: {err}",
                self.path.display()
            ))
        })?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|err| JournalError::Storage(format!("failed to configure sqlite: {err}")))?;
        conn.execute_batch(AUDIT_SCHEMA)
            .map_err(|err| JournalError::Storage(format!("failed to apply schema: {err}")))?;
        Ok(conn)
    }

    /// Count records in one logical stream.
    pub fn stream_len(&self, stream: &str) -> JournalResult<u64> {
        let conn = self.connect()?;
        let count: u64 = conn
            .query_row(
                "SELECT COUNT(*) FROM audit_log WHERE stream = ?",
                params![stream],
                |row| row.get(0),
            )
            .map_err(|err| JournalError::Storage(format!("failed to count stream: {err}")))?;
        Ok(count)
    }

    /// Load the most recent events of one stream, oldest first.
    pub fn tail(&self, stream: &str, limit: usize) -> JournalResult<Vec<AuditEvent>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT payload FROM audit_log WHERE stream = ?
                 ORDER BY id DESC LIMIT ?",
            )
            .map_err(|err| JournalError::Storage(format!("failed to prepare query: {err}")))?;
        let rows = stmt
            .query_map(params![stream, limit as i64], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|err| JournalError::Storage(format!("failed to query stream: {err}")))?;
        let mut events = Vec::new();
        for payload in rows {
            let payload =
                payload.map_err(|err| JournalError::Storage(format!("row error: {err}")))?;
            events.push(serde_json::from_str(&payload)?);
        }
        events.reverse();
        Ok(events)
    }
}

impl Journal for SqliteJournal {
    fn append(&self, component: &str, event: &AuditEvent) -> JournalResult<()> {
        let conn = self.connect()?;
        let payload = serde_json::to_string(event)?;
        conn.execute(
            "INSERT INTO audit_log (stream, component, correlation_id, recorded_at, payload)
             VALUES (?, ?, ?, ?, ?)",
            params![
                event.stream(),
                component,
                event.correlation_id().to_string(),
                event.timestamp().to_rfc3339(),
                payload
            ],
        )
        .map_err(|err| JournalError::Storage(format!("failed to append record: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transition(accepted: bool) -> AuditEvent {
        AuditEvent::StateTransition(StateTransitionRecord {
            from: SystemState::Observing,
            to: SystemState::Eligible,
            accepted,
            reason: "aggregated tradeable".into(),
            actor: "state_machine".into(),
            correlation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn memory_journal_preserves_order_and_streams() {
        let journal = MemoryJournal::new();
        journal.append("state", &sample_transition(true)).unwrap();
        journal.append("state", &sample_transition(false)).unwrap();
        assert_eq!(journal.events().len(), 2);
        assert_eq!(journal.stream("state_transitions").len(), 2);
        assert!(journal.stream("orders").is_empty());
    }

    #[test]
    fn sqlite_journal_round_trips_events() {
        let path = std::env::temp_dir().join(format!("verdict-journal-{}.db", Uuid::new_v4()));
        let journal = SqliteJournal::new(path.clone());
        let event = sample_transition(true);
        journal.append("state", &event).unwrap();
        journal.append("state", &sample_transition(false)).unwrap();

        assert_eq!(journal.stream_len("state_transitions").unwrap(), 2);
        let tail = journal.tail("state_transitions", 10).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0], event);

        let _ = fs::remove_file(path);
    }
}

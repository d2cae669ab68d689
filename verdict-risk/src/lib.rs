//! Multi-domain risk gate: five checkers, max-severity aggregation, and
//! the recovery path out of a lock.

use thiserror::Error;

pub mod checkers;
pub mod context;
pub mod engine;
pub mod recovery;

pub use checkers::{
    AccountSurvivalChecker, BehaviorChecker, CheckerReport, ExecutionIntegrityChecker,
    RegimeChecker, RiskChecker, RiskEvent, SystemChecker,
};
pub use context::{RiskContext, RiskThresholds, TradeRecord};
pub use engine::{CooldownDurations, RiskDecision, RiskEngine};
pub use recovery::RecoveryManager;

/// Result alias for risk operations.
pub type RiskResult<T> = Result<T, RiskError>;

/// Failures raised by the risk subsystem itself (not denials).
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("system is not locked")]
    NotLocked,
    #[error("audit write failed: {0}")]
    Audit(#[from] verdict_journal::JournalError),
}

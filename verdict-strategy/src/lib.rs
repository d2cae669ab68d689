//! Witness panel, health/weight management, claim aggregation, and the
//! strategy lifecycle subsystem.

use thiserror::Error;

use verdict_core::StrategyId;

pub mod aggregate;
pub mod event_witness;
pub mod features;
pub mod health;
pub mod lifecycle;
pub mod panel;
pub mod shadow;
pub mod weight;
pub mod witness;
pub mod witnesses;

pub use aggregate::{Aggregator, WeightSource};
pub use event_witness::{BarPredicate, EventDefinition, EventDefinitionWitness};
pub use health::HealthManager;
pub use lifecycle::{LifecycleManager, SweepReport, ValidationStats};
pub use panel::{PanelCollection, WitnessPanel};
pub use shadow::{ShadowPerformance, ShadowRunner, ShadowTradeRecord};
pub use weight::{WeightClamps, WeightManager};
pub use witness::{Witness, WitnessDescriptor};

/// Result alias used within witness implementations.
pub type WitnessResult<T> = Result<T, WitnessError>;

/// Failure variants surfaced by individual witnesses.
#[derive(Debug, Error)]
pub enum WitnessError {
    /// Raised when a witness's configuration cannot be parsed or is invalid.
    #[error("configuration is invalid: {0}")]
    InvalidConfig(String),
    /// Raised when the witness lacks sufficient historical data to proceed.
    #[error("not enough historical data")]
    NotEnoughData,
    /// Used for all other errors that should bubble up to the panel.
    #[error("internal witness error: {0}")]
    Internal(String),
}

/// Result alias for panel and lifecycle operations.
pub type PanelResult<T> = Result<T, PanelError>;

/// Failures raised by the panel registry and lifecycle operations.
#[derive(Debug, Error)]
pub enum PanelError {
    /// A witness declared capabilities its tier forbids. Fatal to that
    /// witness: registration is refused.
    #[error("architecture violation by {strategy_id}: {detail}")]
    ArchitectureViolation {
        strategy_id: StrategyId,
        detail: String,
    },
    #[error("unknown witness: {0}")]
    UnknownWitness(StrategyId),
    /// Veto witnesses are fixed at registration; their tier and lifecycle
    /// cannot be changed afterwards.
    #[error("veto witness is protected: {0}")]
    VetoProtected(StrategyId),
    #[error("witness {0} is retired")]
    Retired(StrategyId),
    #[error("audit write failed: {0}")]
    Audit(#[from] verdict_journal::JournalError),
}

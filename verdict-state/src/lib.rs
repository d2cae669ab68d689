//! The global trading state machine and regime manager. The machine is the
//! only component allowed to authorize execution.

use thiserror::Error;

pub mod machine;
pub mod regime;

pub use machine::{StateMachine, TransitionOutcome, PERMITTED_TRANSITIONS};
pub use regime::{RegimeConstraints, RegimeManager};

use verdict_core::SystemState;

/// Result alias for state machine operations.
pub type StateResult<T> = Result<T, StateError>;

/// Failures raised by the state machine.
#[derive(Debug, Error)]
pub enum StateError {
    /// The `(from, to)` pair is outside the permitted set. The decision
    /// loop aborts; the machine stays consistent for the next loop.
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: SystemState, to: SystemState },
    #[error("audit write failed: {0}")]
    Audit(#[from] verdict_journal::JournalError),
}

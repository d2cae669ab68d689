//! Decision-loop engine wiring the witness panel, aggregator, risk gate,
//! state machine, and per-user executor together.

pub mod account;
pub mod loop_runner;
pub mod telemetry;
pub mod wiring;

pub use account::AccountTracker;
pub use loop_runner::{DecisionLoop, LoopOutcome, LoopSettings};
pub use telemetry::init_tracing;
pub use wiring::{component_settings, ComponentSettings};

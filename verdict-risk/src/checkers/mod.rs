//! Domain checkers. Each is a value implementing one narrow contract;
//! composition is a list, not a hierarchy.

mod account;
mod behavior;
mod execution;
mod regime;
mod system;

pub use account::AccountSurvivalChecker;
pub use behavior::BehaviorChecker;
pub use execution::ExecutionIntegrityChecker;
pub use regime::RegimeChecker;
pub use system::SystemChecker;

use verdict_core::{RiskEventType, RiskLevel};

use crate::context::RiskContext;

/// One risk observation worth journaling.
#[derive(Clone, Debug)]
pub struct RiskEvent {
    pub event_type: RiskEventType,
    pub level: RiskLevel,
    pub description: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
}

impl RiskEvent {
    #[must_use]
    pub fn new(
        event_type: RiskEventType,
        level: RiskLevel,
        description: impl Into<String>,
        value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            event_type,
            level,
            description: description.into(),
            value: Some(value),
            threshold: Some(threshold),
        }
    }
}

/// Per-domain verdict.
#[derive(Clone, Debug)]
pub struct CheckerReport {
    pub domain: &'static str,
    pub approved: bool,
    pub level: RiskLevel,
    pub reason: Option<String>,
    pub events: Vec<RiskEvent>,
}

impl CheckerReport {
    #[must_use]
    pub fn approve(domain: &'static str) -> Self {
        Self {
            domain,
            approved: true,
            level: RiskLevel::Normal,
            reason: None,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn deny(domain: &'static str, level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            domain,
            approved: false,
            level,
            reason: Some(reason.into()),
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: Vec<RiskEvent>) -> Self {
        self.events = events;
        self
    }
}

/// The checker contract. CPU-bound; must not block.
pub trait RiskChecker: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, context: &RiskContext) -> CheckerReport;
}

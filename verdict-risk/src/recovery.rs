//! Recovery path out of a risk lock.
//!
//! A lock is terminal for the trading cycle; release requires an explicit
//! recovery approval (or the auto-unlock window elapsing), after which the
//! engine resets to normal and the state machine may return to observing.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::engine::RiskEngine;
use crate::{RiskError, RiskResult};

/// Default hours after which a lock becomes eligible for automatic release.
pub const DEFAULT_AUTO_UNLOCK_HOURS: i64 = 24;

pub struct RecoveryManager {
    auto_unlock: Duration,
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_UNLOCK_HOURS)
    }
}

impl RecoveryManager {
    #[must_use]
    pub fn new(auto_unlock_hours: i64) -> Self {
        Self {
            auto_unlock: Duration::hours(auto_unlock_hours),
        }
    }

    /// Whether the lock has aged past the auto-unlock window.
    #[must_use]
    pub fn is_auto_unlock_due(&self, engine: &RiskEngine, now: DateTime<Utc>) -> bool {
        match engine.locked_at() {
            Some(locked_at) if engine.is_locked() => now - locked_at >= self.auto_unlock,
            _ => false,
        }
    }

    /// Approve the unlock. Requires the engine to actually be locked; the
    /// caller drives the matching state machine transitions.
    pub fn approve_unlock(&self, engine: &RiskEngine) -> RiskResult<()> {
        if !engine.is_locked() {
            return Err(RiskError::NotLocked);
        }
        info!("risk unlock approved");
        Ok(())
    }

    /// Complete recovery: reset the engine to normal.
    pub fn complete(&self, engine: &RiskEngine) -> RiskResult<()> {
        if !engine.is_locked() {
            return Err(RiskError::NotLocked);
        }
        engine.reset_to_normal();
        Ok(())
    }
}

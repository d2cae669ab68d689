//! The witness contract.
//!
//! A witness observes bars and emits at most one claim per loop. The trait
//! deliberately exposes no order placement, account access, or position
//! sizing; those capabilities do not exist on this surface, so a strategy
//! cannot acquire them. The declared claim surface is validated against the
//! tier when the witness is registered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verdict_core::{Claim, ClaimType, Direction, StrategyId, WitnessTier};

use crate::WitnessResult;

/// Static identity and declared capabilities of a witness.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WitnessDescriptor {
    pub id: StrategyId,
    pub tier: WitnessTier,
    /// Seconds each emitted claim stays valid.
    pub validity_window_secs: i64,
    /// Claim types this witness may emit; checked against the tier at
    /// registration.
    pub claim_types: Vec<ClaimType>,
    /// Whether the witness ever attaches a direction to its claims.
    pub directional: bool,
}

impl WitnessDescriptor {
    #[must_use]
    pub fn new(
        id: impl Into<StrategyId>,
        tier: WitnessTier,
        validity_window_secs: i64,
        claim_types: Vec<ClaimType>,
        directional: bool,
    ) -> Self {
        Self {
            id: id.into(),
            tier,
            validity_window_secs,
            claim_types,
            directional,
        }
    }

    /// Build a claim stamped with this witness's identity and window.
    #[must_use]
    pub fn claim(
        &self,
        claim_type: ClaimType,
        confidence: f64,
        direction: Option<Direction>,
        constraints: serde_json::Map<String, serde_json::Value>,
        timestamp: DateTime<Utc>,
    ) -> Claim {
        Claim {
            strategy_id: self.id.clone(),
            tier: self.tier,
            claim_type,
            confidence,
            validity_window_secs: self.validity_window_secs,
            direction,
            constraints,
            timestamp,
        }
    }
}

/// A registered strategy. Emits claims, nothing else.
pub trait Witness: Send + Sync {
    /// Identity, tier, and declared claim surface.
    fn descriptor(&self) -> &WitnessDescriptor;

    /// Parse witness parameters before registration. Default is a no-op.
    fn configure(&mut self, _params: toml::Value) -> WitnessResult<()> {
        Ok(())
    }

    /// Observe a read-only bar slice and emit at most one claim.
    fn generate_claim(&mut self, bars: &[verdict_core::Bar]) -> WitnessResult<Option<Claim>>;
}


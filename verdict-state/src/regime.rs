//! Trade regime derivation and advisory constraints.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use tracing::info;

use verdict_core::{Claim, ClaimType, TradeRegime};

/// Advisory per-regime execution constraints. The executor may consult
/// them; they are not binding.
#[derive(Clone, Copy, Debug)]
pub struct RegimeConstraints {
    pub max_position_pct: f64,
    pub max_holding_minutes: i64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

static REGIME_CONSTRAINTS: Lazy<HashMap<TradeRegime, RegimeConstraints>> = Lazy::new(|| {
    HashMap::from([
        (
            TradeRegime::VolatilityExpansion,
            RegimeConstraints {
                max_position_pct: 0.03,
                max_holding_minutes: 30,
                stop_loss_pct: 0.015,
                take_profit_pct: 0.03,
            },
        ),
        (
            TradeRegime::RangeStructureBreak,
            RegimeConstraints {
                max_position_pct: 0.05,
                max_holding_minutes: 120,
                stop_loss_pct: 0.02,
                take_profit_pct: 0.05,
            },
        ),
        (
            TradeRegime::LiquiditySweep,
            RegimeConstraints {
                max_position_pct: 0.02,
                max_holding_minutes: 15,
                stop_loss_pct: 0.01,
                take_profit_pct: 0.02,
            },
        ),
        (
            TradeRegime::NoRegime,
            RegimeConstraints {
                max_position_pct: 0.02,
                max_holding_minutes: 30,
                stop_loss_pct: 0.01,
                take_profit_pct: 0.02,
            },
        ),
    ])
});

/// Derive the regime from the dominant core claim: an explicit `regime`
/// constraint wins, then the claim type.
#[must_use]
pub fn derive_regime(claim: &Claim) -> TradeRegime {
    if let Some(tag) = claim.constraint_str("regime") {
        if let Ok(regime) = tag.parse::<TradeRegime>() {
            return regime;
        }
    }
    if claim.claim_type == ClaimType::RegimeMatched {
        return TradeRegime::VolatilityExpansion;
    }
    TradeRegime::NoRegime
}

struct RegimeState {
    current: TradeRegime,
    confidence: f64,
    set_at: DateTime<Utc>,
    validity_minutes: i64,
}

/// Holds the current regime with a validity window.
pub struct RegimeManager {
    state: Mutex<RegimeState>,
}

impl Default for RegimeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RegimeManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegimeState {
                current: TradeRegime::NoRegime,
                confidence: 0.0,
                set_at: Utc::now(),
                validity_minutes: 15,
            }),
        }
    }

    /// Set the regime with a fresh validity window.
    pub fn set_regime(&self, regime: TradeRegime, confidence: f64, now: DateTime<Utc>) {
        let mut state = self.state.lock().expect("regime poisoned");
        state.current = regime;
        state.confidence = confidence;
        state.set_at = now;
        info!(?regime, confidence, "trade regime set");
    }

    /// Drop back to no-regime.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("regime poisoned");
        state.current = TradeRegime::NoRegime;
        state.confidence = 0.0;
    }

    /// Current regime, decayed to `NoRegime` once the window lapses.
    #[must_use]
    pub fn current(&self, now: DateTime<Utc>) -> TradeRegime {
        let state = self.state.lock().expect("regime poisoned");
        if state.current == TradeRegime::NoRegime {
            return TradeRegime::NoRegime;
        }
        if now - state.set_at >= Duration::minutes(state.validity_minutes) {
            return TradeRegime::NoRegime;
        }
        state.current
    }

    /// Advisory constraints for the current regime.
    #[must_use]
    pub fn constraints(&self, now: DateTime<Utc>) -> RegimeConstraints {
        let regime = self.current(now);
        REGIME_CONSTRAINTS
            .get(&regime)
            .copied()
            .unwrap_or_else(|| REGIME_CONSTRAINTS[&TradeRegime::NoRegime])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_core::{Direction, WitnessTier};

    fn claim_with_regime(tag: Option<&str>, claim_type: ClaimType) -> Claim {
        let mut constraints = serde_json::Map::new();
        if let Some(tag) = tag {
            constraints.insert("regime".into(), tag.into());
        }
        Claim {
            strategy_id: "w1".into(),
            tier: WitnessTier::Core,
            claim_type,
            confidence: 0.7,
            validity_window_secs: 60,
            direction: Some(Direction::Long),
            constraints,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn explicit_regime_constraint_wins() {
        let claim = claim_with_regime(Some("liquidity_sweep"), ClaimType::MarketEligible);
        assert_eq!(derive_regime(&claim), TradeRegime::LiquiditySweep);
    }

    #[test]
    fn regime_matched_falls_back_to_volatility_expansion() {
        let claim = claim_with_regime(None, ClaimType::RegimeMatched);
        assert_eq!(derive_regime(&claim), TradeRegime::VolatilityExpansion);
    }

    #[test]
    fn regime_decays_after_its_window() {
        let manager = RegimeManager::new();
        let now = Utc::now();
        manager.set_regime(TradeRegime::RangeStructureBreak, 0.8, now);
        assert_eq!(manager.current(now), TradeRegime::RangeStructureBreak);
        assert_eq!(
            manager.current(now + Duration::minutes(20)),
            TradeRegime::NoRegime
        );
    }

    #[test]
    fn constraints_track_the_active_regime() {
        let manager = RegimeManager::new();
        let now = Utc::now();
        manager.set_regime(TradeRegime::LiquiditySweep, 0.8, now);
        let constraints = manager.constraints(now);
        assert_eq!(constraints.max_position_pct, 0.02);
        assert_eq!(constraints.max_holding_minutes, 15);
    }
}

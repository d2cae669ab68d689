//! Veto witness: risk sentinel with absolute veto power.

use serde::{Deserialize, Serialize};
use tracing::warn;

use verdict_core::{Bar, Claim, ClaimType, WitnessTier};

use crate::witness::{Witness, WitnessDescriptor};
use crate::{WitnessError, WitnessResult};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskSentinelConfig {
    pub max_position_pct: f64,
    pub max_drawdown_pct: f64,
    pub max_consecutive_losses: u32,
    pub extreme_volatility_threshold: f64,
}

impl Default for RiskSentinelConfig {
    fn default() -> Self {
        Self {
            max_position_pct: 0.30,
            max_drawdown_pct: 0.20,
            max_consecutive_losses: 3,
            extreme_volatility_threshold: 0.05,
        }
    }
}

/// Fixed veto-tier witness. Its claims block execution; they never carry a
/// direction.
pub struct RiskSentinelWitness {
    descriptor: WitnessDescriptor,
    cfg: RiskSentinelConfig,
    current_position_pct: f64,
    current_drawdown_pct: f64,
    consecutive_losses: u32,
}

impl Default for RiskSentinelWitness {
    fn default() -> Self {
        Self::new(RiskSentinelConfig::default())
    }
}

impl RiskSentinelWitness {
    #[must_use]
    pub fn new(cfg: RiskSentinelConfig) -> Self {
        Self {
            descriptor: WitnessDescriptor::new(
                "risk_sentinel",
                WitnessTier::Veto,
                120,
                vec![ClaimType::ExecutionVeto],
                false,
            ),
            cfg,
            current_position_pct: 0.0,
            current_drawdown_pct: 0.0,
            consecutive_losses: 0,
        }
    }

    /// Refresh the tracked exposure.
    pub fn update_position(&mut self, position_pct: f64) {
        self.current_position_pct = position_pct;
    }

    /// Refresh the tracked drawdown.
    pub fn update_drawdown(&mut self, drawdown_pct: f64) {
        self.current_drawdown_pct = drawdown_pct;
    }

    /// Fold in a trade outcome for the consecutive-loss counter.
    pub fn record_trade_result(&mut self, is_win: bool) {
        if is_win {
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
        }
    }

    fn veto(&self, reason: &str, value: f64, threshold: f64, ts: chrono::DateTime<chrono::Utc>) -> Claim {
        warn!(reason, value, threshold, "risk sentinel veto");
        let mut constraints = serde_json::Map::new();
        constraints.insert("veto_reason".into(), reason.into());
        constraints.insert("value".into(), serde_json::json!(value));
        constraints.insert("threshold".into(), serde_json::json!(threshold));
        self.descriptor
            .claim(ClaimType::ExecutionVeto, 1.0, None, constraints, ts)
    }
}

impl Witness for RiskSentinelWitness {
    fn descriptor(&self) -> &WitnessDescriptor {
        &self.descriptor
    }

    fn configure(&mut self, params: toml::Value) -> WitnessResult<()> {
        let cfg: RiskSentinelConfig = params.try_into().map_err(|err: toml::de::Error| {
            WitnessError::InvalidConfig(format!("failed to parse config: {err}"))
        })?;
        self.cfg = cfg;
        Ok(())
    }

    fn generate_claim(&mut self, bars: &[Bar]) -> WitnessResult<Option<Claim>> {
        let Some(last) = bars.last() else {
            return Ok(None);
        };
        let ts = last.timestamp;

        if bars.len() >= 2 {
            let prev = &bars[bars.len() - 2];
            if prev.close != 0.0 {
                let change = ((last.close - prev.close) / prev.close).abs();
                if change >= self.cfg.extreme_volatility_threshold {
                    return Ok(Some(self.veto(
                        "extreme_volatility",
                        change,
                        self.cfg.extreme_volatility_threshold,
                        ts,
                    )));
                }
            }
        }

        if self.current_position_pct >= self.cfg.max_position_pct {
            return Ok(Some(self.veto(
                "position_limit_exceeded",
                self.current_position_pct,
                self.cfg.max_position_pct,
                ts,
            )));
        }

        if self.current_drawdown_pct >= self.cfg.max_drawdown_pct {
            return Ok(Some(self.veto(
                "drawdown_limit_exceeded",
                self.current_drawdown_pct,
                self.cfg.max_drawdown_pct,
                ts,
            )));
        }

        if self.consecutive_losses >= self.cfg.max_consecutive_losses {
            return Ok(Some(self.veto(
                "consecutive_losses_exceeded",
                f64::from(self.consecutive_losses),
                f64::from(self.cfg.max_consecutive_losses),
                ts,
            )));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use verdict_core::Interval;

    fn bars(last_close: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        vec![
            Bar {
                symbol: "BTCUSDT".into(),
                interval: Interval::OneMinute,
                open: 100.0,
                high: 100.5,
                low: 99.5,
                close: 100.0,
                volume: 1.0,
                timestamp: start,
            },
            Bar {
                symbol: "BTCUSDT".into(),
                interval: Interval::OneMinute,
                open: 100.0,
                high: last_close.max(100.0),
                low: last_close.min(100.0),
                close: last_close,
                volume: 1.0,
                timestamp: start + Duration::minutes(1),
            },
        ]
    }

    #[test]
    fn extreme_move_vetoes() {
        let mut sentinel = RiskSentinelWitness::default();
        let claim = sentinel.generate_claim(&bars(94.0)).unwrap().unwrap();
        assert_eq!(claim.claim_type, ClaimType::ExecutionVeto);
        assert_eq!(claim.direction, None);
        assert_eq!(claim.constraint_str("veto_reason"), Some("extreme_volatility"));
    }

    #[test]
    fn consecutive_losses_veto_and_reset() {
        let mut sentinel = RiskSentinelWitness::default();
        for _ in 0..3 {
            sentinel.record_trade_result(false);
        }
        assert!(sentinel.generate_claim(&bars(100.1)).unwrap().is_some());
        sentinel.record_trade_result(true);
        assert!(sentinel.generate_claim(&bars(100.1)).unwrap().is_none());
    }

    #[test]
    fn quiet_market_with_clean_book_is_silent() {
        let mut sentinel = RiskSentinelWitness::default();
        assert!(sentinel.generate_claim(&bars(100.2)).unwrap().is_none());
    }
}

//! Auxiliary witness: bar microstructure imbalance.

use serde::{Deserialize, Serialize};

use verdict_core::{Bar, Claim, ClaimType, Direction, WitnessTier};

use crate::features;
use crate::witness::{Witness, WitnessDescriptor};
use crate::{WitnessError, WitnessResult};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MicrostructureConfig {
    pub lookback: usize,
    /// Net body/range imbalance that counts as directional pressure.
    pub imbalance_threshold: f64,
    /// Below this absolute imbalance, elevated ranges read as chop.
    pub chop_zone: f64,
    /// Range expansion multiple that marks a contested market.
    pub chop_range_multiplier: f64,
}

impl Default for MicrostructureConfig {
    fn default() -> Self {
        Self {
            lookback: 10,
            imbalance_threshold: 0.35,
            chop_zone: 0.08,
            chop_range_multiplier: 1.5,
        }
    }
}

/// Reads candle bodies against their ranges: sustained one-sided bodies
/// support the regime, wide two-sided bars flag conflict.
pub struct MicrostructureWitness {
    descriptor: WitnessDescriptor,
    cfg: MicrostructureConfig,
}

impl Default for MicrostructureWitness {
    fn default() -> Self {
        Self::new(MicrostructureConfig::default())
    }
}

impl MicrostructureWitness {
    #[must_use]
    pub fn new(cfg: MicrostructureConfig) -> Self {
        Self {
            descriptor: WitnessDescriptor::new(
                "microstructure",
                WitnessTier::Auxiliary,
                60,
                vec![ClaimType::RegimeMatched, ClaimType::RegimeConflict],
                true,
            ),
            cfg,
        }
    }

    fn range_expanded(&self, bars: &[Bar]) -> bool {
        if bars.len() < self.cfg.lookback * 2 {
            return false;
        }
        let recent = &bars[bars.len() - self.cfg.lookback..];
        let prior = &bars[bars.len() - self.cfg.lookback * 2..bars.len() - self.cfg.lookback];
        let recent_range: f64 = recent.iter().map(|bar| bar.high - bar.low).sum();
        let prior_range: f64 = prior.iter().map(|bar| bar.high - bar.low).sum();
        prior_range > 0.0 && recent_range > prior_range * self.cfg.chop_range_multiplier
    }
}

impl Witness for MicrostructureWitness {
    fn descriptor(&self) -> &WitnessDescriptor {
        &self.descriptor
    }

    fn configure(&mut self, params: toml::Value) -> WitnessResult<()> {
        let cfg: MicrostructureConfig = params.try_into().map_err(|err: toml::de::Error| {
            WitnessError::InvalidConfig(format!("failed to parse config: {err}"))
        })?;
        if cfg.lookback == 0 {
            return Err(WitnessError::InvalidConfig(
                "lookback must be positive".into(),
            ));
        }
        self.cfg = cfg;
        Ok(())
    }

    fn generate_claim(&mut self, bars: &[Bar]) -> WitnessResult<Option<Claim>> {
        let Some(imbalance) = features::body_imbalance(bars, self.cfg.lookback) else {
            return Ok(None);
        };
        let last = bars.last().expect("imbalance implies bars");

        if imbalance.abs() >= self.cfg.imbalance_threshold {
            let direction = if imbalance > 0.0 {
                Direction::Long
            } else {
                Direction::Short
            };
            let confidence = (0.5 + imbalance.abs() * 0.4).min(0.85);
            let mut constraints = serde_json::Map::new();
            constraints.insert("imbalance".into(), serde_json::json!(imbalance));
            return Ok(Some(self.descriptor.claim(
                ClaimType::RegimeMatched,
                confidence,
                Some(direction),
                constraints,
                last.timestamp,
            )));
        }

        if imbalance.abs() <= self.cfg.chop_zone && self.range_expanded(bars) {
            let mut constraints = serde_json::Map::new();
            constraints.insert("imbalance".into(), serde_json::json!(imbalance));
            return Ok(Some(self.descriptor.claim(
                ClaimType::RegimeConflict,
                0.6,
                None,
                constraints,
                last.timestamp,
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

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        Bar {
            symbol: "BTCUSDT".into(),
            interval: Interval::OneMinute,
            open,
            high,
            low,
            close,
            volume: 1.0,
            timestamp: start + Duration::minutes(i),
        }
    }

    #[test]
    fn one_sided_bodies_support_the_direction() {
        let mut witness = MicrostructureWitness::default();
        let bars: Vec<Bar> = (0..12)
            .map(|i| bar(i, 100.0, 101.0, 99.8, 100.9))
            .collect();
        let claim = witness.generate_claim(&bars).unwrap().unwrap();
        assert_eq!(claim.claim_type, ClaimType::RegimeMatched);
        assert_eq!(claim.direction, Some(Direction::Long));
    }

    #[test]
    fn wide_two_sided_bars_flag_conflict() {
        let mut witness = MicrostructureWitness::default();
        let mut bars: Vec<Bar> = (0..10).map(|i| bar(i, 100.0, 100.4, 99.6, 100.0)).collect();
        for i in 10..20 {
            // Ranges triple but bodies cancel.
            let close = if i % 2 == 0 { 100.6 } else { 99.4 };
            bars.push(bar(i, 100.0, 101.5, 98.5, close));
        }
        let claim = witness.generate_claim(&bars).unwrap().unwrap();
        assert_eq!(claim.claim_type, ClaimType::RegimeConflict);
        assert_eq!(claim.direction, None);
    }
}

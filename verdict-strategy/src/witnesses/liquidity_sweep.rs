//! Core witness: liquidity sweep of a prior extreme.

use serde::{Deserialize, Serialize};

use verdict_core::{Bar, Claim, ClaimType, Direction, WitnessTier};

use crate::features;
use crate::witness::{Witness, WitnessDescriptor};
use crate::{WitnessError, WitnessResult};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LiquiditySweepConfig {
    pub lookback_period: usize,
    /// The wick must pierce the prior extreme by this fraction.
    pub pierce_pct: f64,
    /// The close must reclaim the extreme by this fraction.
    pub reclaim_pct: f64,
}

impl Default for LiquiditySweepConfig {
    fn default() -> Self {
        Self {
            lookback_period: 40,
            pierce_pct: 0.0005,
            reclaim_pct: 0.0005,
        }
    }
}

/// Detects stop-hunt wicks: a pierce through the prior low (or high) that
/// closes back inside the range, implying swept liquidity.
pub struct LiquiditySweepWitness {
    descriptor: WitnessDescriptor,
    cfg: LiquiditySweepConfig,
}

impl Default for LiquiditySweepWitness {
    fn default() -> Self {
        Self::new(LiquiditySweepConfig::default())
    }
}

impl LiquiditySweepWitness {
    #[must_use]
    pub fn new(cfg: LiquiditySweepConfig) -> Self {
        Self {
            descriptor: WitnessDescriptor::new(
                "liquidity_sweep",
                WitnessTier::Core,
                45,
                vec![ClaimType::MarketEligible],
                true,
            ),
            cfg,
        }
    }
}

impl Witness for LiquiditySweepWitness {
    fn descriptor(&self) -> &WitnessDescriptor {
        &self.descriptor
    }

    fn configure(&mut self, params: toml::Value) -> WitnessResult<()> {
        let cfg: LiquiditySweepConfig = params.try_into().map_err(|err: toml::de::Error| {
            WitnessError::InvalidConfig(format!("failed to parse config: {err}"))
        })?;
        if cfg.lookback_period < 10 {
            return Err(WitnessError::InvalidConfig(
                "lookback must be at least 10".into(),
            ));
        }
        self.cfg = cfg;
        Ok(())
    }

    fn generate_claim(&mut self, bars: &[Bar]) -> WitnessResult<Option<Claim>> {
        if bars.len() < self.cfg.lookback_period + 1 {
            return Ok(None);
        }
        let last = bars.last().expect("non-empty slice");
        let (Some(prior_high), Some(prior_low)) = (
            features::rolling_high(bars, self.cfg.lookback_period, 1),
            features::rolling_low(bars, self.cfg.lookback_period, 1),
        ) else {
            return Ok(None);
        };

        let swept_low = last.low < prior_low * (1.0 - self.cfg.pierce_pct)
            && last.close > prior_low * (1.0 + self.cfg.reclaim_pct);
        let swept_high = last.high > prior_high * (1.0 + self.cfg.pierce_pct)
            && last.close < prior_high * (1.0 - self.cfg.reclaim_pct);

        let (direction, extreme, wick_depth) = if swept_low {
            (Direction::Long, prior_low, (prior_low - last.low) / prior_low)
        } else if swept_high {
            (
                Direction::Short,
                prior_high,
                (last.high - prior_high) / prior_high,
            )
        } else {
            return Ok(None);
        };

        let confidence = (0.62 + (wick_depth / self.cfg.pierce_pct).min(4.0) * 0.06).min(0.9);
        let mut constraints = serde_json::Map::new();
        constraints.insert("regime".into(), "liquidity_sweep".into());
        constraints.insert("swept_level".into(), serde_json::json!(extreme));
        Ok(Some(self.descriptor.claim(
            ClaimType::MarketEligible,
            confidence,
            Some(direction),
            constraints,
            last.timestamp,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use verdict_core::Interval;

    fn series_with_sweep(sweep_low: bool) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut bars: Vec<Bar> = (0..45)
            .map(|i| Bar {
                symbol: "BTCUSDT".into(),
                interval: Interval::OneMinute,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
                timestamp: start + Duration::minutes(i),
            })
            .collect();
        let last = if sweep_low {
            Bar {
                symbol: "BTCUSDT".into(),
                interval: Interval::OneMinute,
                open: 99.4,
                high: 100.2,
                low: 98.5, // pierces the 99.0 prior low
                close: 99.8,
                volume: 3.0,
                timestamp: start + Duration::minutes(45),
            }
        } else {
            Bar {
                symbol: "BTCUSDT".into(),
                interval: Interval::OneMinute,
                open: 100.6,
                high: 101.6, // pierces the 101.0 prior high
                low: 99.9,
                close: 100.2,
                volume: 3.0,
                timestamp: start + Duration::minutes(45),
            }
        };
        bars.push(last);
        bars
    }

    #[test]
    fn low_sweep_reads_long() {
        let mut witness = LiquiditySweepWitness::default();
        let claim = witness
            .generate_claim(&series_with_sweep(true))
            .unwrap()
            .unwrap();
        assert_eq!(claim.direction, Some(Direction::Long));
        assert_eq!(claim.constraint_str("regime"), Some("liquidity_sweep"));
    }

    #[test]
    fn high_sweep_reads_short() {
        let mut witness = LiquiditySweepWitness::default();
        let claim = witness
            .generate_claim(&series_with_sweep(false))
            .unwrap()
            .unwrap();
        assert_eq!(claim.direction, Some(Direction::Short));
    }
}

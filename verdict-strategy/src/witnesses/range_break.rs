//! Core witness: break of an established range structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verdict_core::{Bar, Claim, ClaimType, Direction, WitnessTier};

use crate::features;
use crate::witness::{Witness, WitnessDescriptor};
use crate::{WitnessError, WitnessResult};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RangeBreakConfig {
    pub range_period: usize,
    /// Minimum width of the range as a fraction of price; narrower ranges
    /// produce noise breaks.
    pub min_range_pct: f64,
    /// Close must clear the boundary by this margin.
    pub breakout_margin: f64,
    /// Minimum minutes between successive signals.
    pub signal_gap_minutes: i64,
}

impl Default for RangeBreakConfig {
    fn default() -> Self {
        Self {
            range_period: 30,
            min_range_pct: 0.004,
            breakout_margin: 0.001,
            signal_gap_minutes: 15,
        }
    }
}

/// Flags closes that escape the rolling high/low box of the prior bars.
pub struct RangeBreakWitness {
    descriptor: WitnessDescriptor,
    cfg: RangeBreakConfig,
    last_signal_at: Option<DateTime<Utc>>,
}

impl Default for RangeBreakWitness {
    fn default() -> Self {
        Self::new(RangeBreakConfig::default())
    }
}

impl RangeBreakWitness {
    #[must_use]
    pub fn new(cfg: RangeBreakConfig) -> Self {
        Self {
            descriptor: WitnessDescriptor::new(
                "range_break",
                WitnessTier::Core,
                60,
                vec![ClaimType::MarketEligible],
                true,
            ),
            cfg,
            last_signal_at: None,
        }
    }
}

impl Witness for RangeBreakWitness {
    fn descriptor(&self) -> &WitnessDescriptor {
        &self.descriptor
    }

    fn configure(&mut self, params: toml::Value) -> WitnessResult<()> {
        let cfg: RangeBreakConfig = params.try_into().map_err(|err: toml::de::Error| {
            WitnessError::InvalidConfig(format!("failed to parse config: {err}"))
        })?;
        if cfg.range_period < 5 {
            return Err(WitnessError::InvalidConfig(
                "range period must be at least 5".into(),
            ));
        }
        self.cfg = cfg;
        self.last_signal_at = None;
        Ok(())
    }

    fn generate_claim(&mut self, bars: &[Bar]) -> WitnessResult<Option<Claim>> {
        if bars.len() < self.cfg.range_period + 1 {
            return Ok(None);
        }
        let last = bars.last().expect("non-empty slice");
        if let Some(previous) = self.last_signal_at {
            if (last.timestamp - previous).num_minutes() < self.cfg.signal_gap_minutes {
                return Ok(None);
            }
        }
        let (Some(high), Some(low)) = (
            features::rolling_high(bars, self.cfg.range_period, 1),
            features::rolling_low(bars, self.cfg.range_period, 1),
        ) else {
            return Ok(None);
        };
        if last.close == 0.0 {
            return Ok(None);
        }
        let range_pct = (high - low) / last.close;
        if range_pct < self.cfg.min_range_pct {
            return Ok(None);
        }

        let up_break = last.close > high * (1.0 + self.cfg.breakout_margin);
        let down_break = last.close < low * (1.0 - self.cfg.breakout_margin);
        let (direction, distance) = if up_break {
            (Direction::Long, (last.close - high) / high)
        } else if down_break {
            (Direction::Short, (low - last.close) / low)
        } else {
            return Ok(None);
        };

        // Deeper clearance of the boundary reads as stronger conviction.
        let confidence = (0.6 + (distance / self.cfg.breakout_margin).min(3.0) * 0.1).min(0.9);
        self.last_signal_at = Some(last.timestamp);

        let mut constraints = serde_json::Map::new();
        constraints.insert("regime".into(), "range_structure_break".into());
        constraints.insert("range_high".into(), serde_json::json!(high));
        constraints.insert("range_low".into(), serde_json::json!(low));
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
    use chrono::{Duration, TimeZone};
    use verdict_core::Interval;

    fn ranged_series(range_bars: usize, final_close: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut bars: Vec<Bar> = (0..range_bars)
            .map(|i| Bar {
                symbol: "BTCUSDT".into(),
                interval: Interval::OneMinute,
                open: 100.0,
                high: 100.5,
                low: 99.5,
                close: 100.0,
                volume: 1.0,
                timestamp: start + Duration::minutes(i as i64),
            })
            .collect();
        bars.push(Bar {
            symbol: "BTCUSDT".into(),
            interval: Interval::OneMinute,
            open: 100.0,
            high: final_close + 0.2,
            low: 99.9,
            close: final_close,
            volume: 2.0,
            timestamp: start + Duration::minutes(range_bars as i64),
        });
        bars
    }

    #[test]
    fn upside_break_emits_long() {
        let mut witness = RangeBreakWitness::default();
        let bars = ranged_series(35, 101.2);
        let claim = witness.generate_claim(&bars).unwrap().unwrap();
        assert_eq!(claim.direction, Some(Direction::Long));
        assert_eq!(claim.constraint_str("regime"), Some("range_structure_break"));
        assert!(claim.confidence >= 0.6);
    }

    #[test]
    fn close_inside_the_range_is_silent() {
        let mut witness = RangeBreakWitness::default();
        let bars = ranged_series(35, 100.2);
        assert!(witness.generate_claim(&bars).unwrap().is_none());
    }

    #[test]
    fn signals_are_rate_limited() {
        let mut witness = RangeBreakWitness::default();
        let bars = ranged_series(35, 101.2);
        assert!(witness.generate_claim(&bars).unwrap().is_some());
        // Same timestamp again: inside the gap, no repeat signal.
        assert!(witness.generate_claim(&bars).unwrap().is_none());
    }
}

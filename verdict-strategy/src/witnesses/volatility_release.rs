//! Core witness: volatility release after a compression phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use verdict_core::{Bar, Claim, ClaimType, Direction, WitnessTier};

use crate::features;
use crate::witness::{Witness, WitnessDescriptor};
use crate::{WitnessError, WitnessResult};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct VolatilityReleaseConfig {
    pub compression_threshold: f64,
    pub lookback_period: usize,
    pub atr_period: usize,
    pub time_decay_hours: f64,
    pub min_confidence: f64,
}

impl Default for VolatilityReleaseConfig {
    fn default() -> Self {
        Self {
            compression_threshold: 0.5,
            lookback_period: 20,
            atr_period: 14,
            time_decay_hours: 4.0,
            min_confidence: 0.6,
        }
    }
}

/// Detects the release that follows an ATR compression: the deeper and the
/// longer the market coiled, the stronger the signal.
pub struct VolatilityReleaseWitness {
    descriptor: WitnessDescriptor,
    cfg: VolatilityReleaseConfig,
    /// Armed while compressed: start time and the deepest ratio seen.
    compression: Option<(DateTime<Utc>, f64)>,
}

impl Default for VolatilityReleaseWitness {
    fn default() -> Self {
        Self::new(VolatilityReleaseConfig::default())
    }
}

impl VolatilityReleaseWitness {
    #[must_use]
    pub fn new(cfg: VolatilityReleaseConfig) -> Self {
        Self {
            descriptor: WitnessDescriptor::new(
                "volatility_release",
                WitnessTier::Core,
                60,
                vec![ClaimType::MarketEligible],
                true,
            ),
            cfg,
            compression: None,
        }
    }

    fn direction(bars: &[Bar]) -> Direction {
        let tail = &bars[bars.len().saturating_sub(3)..];
        let first_open = tail.first().map(|bar| bar.open).unwrap_or(0.0);
        let last_close = tail.last().map(|bar| bar.close).unwrap_or(0.0);
        if last_close >= first_open {
            Direction::Long
        } else {
            Direction::Short
        }
    }

    fn confidence(&self, ratio: f64, time_factor: f64) -> f64 {
        let compression_score = (1.0 - ratio).max(0.0);
        let base = 0.5 + compression_score * 0.3;
        (base + time_factor * 0.1).min(0.95)
    }
}

impl Witness for VolatilityReleaseWitness {
    fn descriptor(&self) -> &WitnessDescriptor {
        &self.descriptor
    }

    fn configure(&mut self, params: toml::Value) -> WitnessResult<()> {
        let cfg: VolatilityReleaseConfig = params.try_into().map_err(|err: toml::de::Error| {
            WitnessError::InvalidConfig(format!("failed to parse config: {err}"))
        })?;
        if cfg.atr_period == 0 || cfg.lookback_period <= cfg.atr_period {
            return Err(WitnessError::InvalidConfig(
                "lookback must exceed the ATR period".into(),
            ));
        }
        self.cfg = cfg;
        self.compression = None;
        Ok(())
    }

    fn generate_claim(&mut self, bars: &[Bar]) -> WitnessResult<Option<Claim>> {
        if bars.len() < self.cfg.lookback_period + self.cfg.atr_period {
            return Ok(None);
        }
        let now = bars.last().expect("non-empty slice").timestamp;
        let Some(ratio) =
            features::compression_ratio(bars, self.cfg.atr_period, self.cfg.lookback_period)
        else {
            return Ok(None);
        };

        if ratio < self.cfg.compression_threshold {
            match &mut self.compression {
                Some((_, deepest)) => *deepest = deepest.min(ratio),
                None => {
                    self.compression = Some((now, ratio));
                    debug!(ratio, "volatility compression started");
                }
            }
            return Ok(None);
        }

        let Some((started, deepest_ratio)) = self.compression.take() else {
            return Ok(None);
        };
        let hours_compressed = (now - started).num_seconds() as f64 / 3600.0;
        let time_factor = (hours_compressed / self.cfg.time_decay_hours).min(1.0);
        let confidence = self.confidence(deepest_ratio, time_factor);
        if confidence < self.cfg.min_confidence {
            return Ok(None);
        }

        let direction = Self::direction(bars);
        let mut constraints = serde_json::Map::new();
        constraints.insert("regime".into(), "volatility_expansion".into());
        constraints.insert("compression_ratio".into(), serde_json::json!(deepest_ratio));
        constraints.insert("time_factor".into(), serde_json::json!(time_factor));
        Ok(Some(self.descriptor.claim(
            ClaimType::MarketEligible,
            confidence,
            Some(direction),
            constraints,
            now,
        )))
    }
}

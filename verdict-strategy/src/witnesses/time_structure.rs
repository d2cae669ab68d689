//! Auxiliary witness: session-time structure.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use verdict_core::{Bar, Claim, ClaimType, Direction, WitnessTier};

use crate::witness::{Witness, WitnessDescriptor};
use crate::{WitnessError, WitnessResult};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeStructureConfig {
    /// UTC hour window in which the session edge applies.
    pub start_hour: u32,
    pub end_hour: u32,
    pub momentum_lookback: usize,
    pub min_momentum_pct: f64,
}

impl Default for TimeStructureConfig {
    fn default() -> Self {
        Self {
            start_hour: 13,
            end_hour: 17,
            momentum_lookback: 12,
            min_momentum_pct: 0.002,
        }
    }
}

/// Supports the dominant direction during historically directional session
/// hours. Never drives a trade on its own.
pub struct TimeStructureWitness {
    descriptor: WitnessDescriptor,
    cfg: TimeStructureConfig,
}

impl Default for TimeStructureWitness {
    fn default() -> Self {
        Self::new(TimeStructureConfig::default())
    }
}

impl TimeStructureWitness {
    #[must_use]
    pub fn new(cfg: TimeStructureConfig) -> Self {
        Self {
            descriptor: WitnessDescriptor::new(
                "time_structure",
                WitnessTier::Auxiliary,
                90,
                vec![ClaimType::RegimeMatched],
                true,
            ),
            cfg,
        }
    }

    fn in_session(&self, hour: u32) -> bool {
        if self.cfg.start_hour <= self.cfg.end_hour {
            (self.cfg.start_hour..self.cfg.end_hour).contains(&hour)
        } else {
            hour >= self.cfg.start_hour || hour < self.cfg.end_hour
        }
    }
}

impl Witness for TimeStructureWitness {
    fn descriptor(&self) -> &WitnessDescriptor {
        &self.descriptor
    }

    fn configure(&mut self, params: toml::Value) -> WitnessResult<()> {
        let cfg: TimeStructureConfig = params.try_into().map_err(|err: toml::de::Error| {
            WitnessError::InvalidConfig(format!("failed to parse config: {err}"))
        })?;
        if cfg.start_hour > 23 || cfg.end_hour > 24 {
            return Err(WitnessError::InvalidConfig("hours must be UTC".into()));
        }
        self.cfg = cfg;
        Ok(())
    }

    fn generate_claim(&mut self, bars: &[Bar]) -> WitnessResult<Option<Claim>> {
        if bars.len() <= self.cfg.momentum_lookback {
            return Ok(None);
        }
        let last = bars.last().expect("non-empty slice");
        if !self.in_session(last.timestamp.hour()) {
            return Ok(None);
        }
        let past = &bars[bars.len() - 1 - self.cfg.momentum_lookback];
        if past.close == 0.0 {
            return Ok(None);
        }
        let momentum = (last.close - past.close) / past.close;
        if momentum.abs() < self.cfg.min_momentum_pct {
            return Ok(None);
        }
        let direction = if momentum > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        };
        let confidence = (0.52 + (momentum.abs() / self.cfg.min_momentum_pct).min(4.0) * 0.05)
            .min(0.8);
        let mut constraints = serde_json::Map::new();
        constraints.insert("session_hour".into(), serde_json::json!(last.timestamp.hour()));
        constraints.insert("momentum".into(), serde_json::json!(momentum));
        Ok(Some(self.descriptor.claim(
            ClaimType::RegimeMatched,
            confidence,
            Some(direction),
            constraints,
            last.timestamp,
        )))
    }
}

//! Veto witness: macro event blackout windows.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use verdict_core::{Bar, Claim, ClaimType, WitnessTier};

use crate::witness::{Witness, WitnessDescriptor};
use crate::{WitnessError, WitnessResult};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MacroSentinelConfig {
    /// UTC `[start_hour, end_hour)` windows during which execution is
    /// blocked (scheduled macro releases, auction opens).
    pub blackout_windows: Vec<(u32, u32)>,
}

impl Default for MacroSentinelConfig {
    fn default() -> Self {
        Self {
            blackout_windows: vec![(12, 14)],
        }
    }
}

/// Fixed veto-tier witness blocking execution during macro blackout hours.
pub struct MacroSentinelWitness {
    descriptor: WitnessDescriptor,
    cfg: MacroSentinelConfig,
}

impl Default for MacroSentinelWitness {
    fn default() -> Self {
        Self::new(MacroSentinelConfig::default())
    }
}

impl MacroSentinelWitness {
    #[must_use]
    pub fn new(cfg: MacroSentinelConfig) -> Self {
        Self {
            descriptor: WitnessDescriptor::new(
                "macro_sentinel",
                WitnessTier::Veto,
                120,
                vec![ClaimType::ExecutionVeto],
                false,
            ),
            cfg,
        }
    }

    fn in_blackout(&self, hour: u32) -> bool {
        self.cfg.blackout_windows.iter().any(|&(start, end)| {
            if start <= end {
                (start..end).contains(&hour)
            } else {
                hour >= start || hour < end
            }
        })
    }
}

impl Witness for MacroSentinelWitness {
    fn descriptor(&self) -> &WitnessDescriptor {
        &self.descriptor
    }

    fn configure(&mut self, params: toml::Value) -> WitnessResult<()> {
        let cfg: MacroSentinelConfig = params.try_into().map_err(|err: toml::de::Error| {
            WitnessError::InvalidConfig(format!("failed to parse config: {err}"))
        })?;
        if cfg.blackout_windows.iter().any(|&(s, e)| s > 23 || e > 24) {
            return Err(WitnessError::InvalidConfig(
                "blackout hours must be UTC".into(),
            ));
        }
        self.cfg = cfg;
        Ok(())
    }

    fn generate_claim(&mut self, bars: &[Bar]) -> WitnessResult<Option<Claim>> {
        let Some(last) = bars.last() else {
            return Ok(None);
        };
        let hour = last.timestamp.hour();
        if !self.in_blackout(hour) {
            return Ok(None);
        }
        let mut constraints = serde_json::Map::new();
        constraints.insert("veto_reason".into(), "macro_blackout".into());
        constraints.insert("hour".into(), serde_json::json!(hour));
        Ok(Some(self.descriptor.claim(
            ClaimType::ExecutionVeto,
            1.0,
            None,
            constraints,
            last.timestamp,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use verdict_core::Interval;

    fn bar_at(hour: u32) -> Vec<Bar> {
        vec![Bar {
            symbol: "BTCUSDT".into(),
            interval: Interval::OneMinute,
            open: 100.0,
            high: 100.5,
            low: 99.5,
            close: 100.0,
            volume: 1.0,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, hour, 30, 0).unwrap(),
        }]
    }

    #[test]
    fn blackout_hours_veto() {
        let mut sentinel = MacroSentinelWitness::default();
        let claim = sentinel.generate_claim(&bar_at(13)).unwrap().unwrap();
        assert_eq!(claim.claim_type, ClaimType::ExecutionVeto);
        assert_eq!(claim.constraint_str("veto_reason"), Some("macro_blackout"));
    }

    #[test]
    fn open_hours_are_silent() {
        let mut sentinel = MacroSentinelWitness::default();
        assert!(sentinel.generate_claim(&bar_at(9)).unwrap().is_none());
    }

    #[test]
    fn wrapping_windows_cover_midnight() {
        let mut sentinel = MacroSentinelWitness::new(MacroSentinelConfig {
            blackout_windows: vec![(22, 2)],
        });
        assert!(sentinel.generate_claim(&bar_at(23)).unwrap().is_some());
        assert!(sentinel.generate_claim(&bar_at(1)).unwrap().is_some());
        assert!(sentinel.generate_claim(&bar_at(12)).unwrap().is_none());
    }
}

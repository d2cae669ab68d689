//! Declarative witness built from an event definition.
//!
//! Discovered hypotheses are promoted into this single concrete type: a
//! predicate over bar features plus tier, direction, and confidence. The
//! registry stores instances, never generated types.

use serde::{Deserialize, Serialize};

use verdict_core::{Bar, ClaimType, Direction, StrategyId, WitnessTier};

use crate::features;
use crate::witness::{Witness, WitnessDescriptor};
use crate::{WitnessError, WitnessResult};

/// Predicate over a bar window. Composable with `All`/`Any`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BarPredicate {
    /// Close-to-close move over `lookback` bars exceeds `threshold`.
    PriceChangeAbove { lookback: usize, threshold: f64 },
    /// Close-to-close move over `lookback` bars falls below `-threshold`.
    PriceChangeBelow { lookback: usize, threshold: f64 },
    /// Short/long ATR ratio below `threshold`.
    RangeCompressionBelow {
        atr_period: usize,
        lookback: usize,
        threshold: f64,
    },
    /// Last bar volume exceeds `multiplier` × trailing mean volume.
    VolumeSpikeAbove { lookback: usize, multiplier: f64 },
    /// Last bar falls inside the UTC hour window `[start_hour, end_hour)`.
    SessionWindow { start_hour: u32, end_hour: u32 },
    All(Vec<BarPredicate>),
    Any(Vec<BarPredicate>),
}

impl BarPredicate {
    /// Evaluate the predicate against a bar window.
    #[must_use]
    pub fn evaluate(&self, bars: &[Bar]) -> bool {
        match self {
            Self::PriceChangeAbove { lookback, threshold } => {
                change_over(bars, *lookback).map_or(false, |change| change > *threshold)
            }
            Self::PriceChangeBelow { lookback, threshold } => {
                change_over(bars, *lookback).map_or(false, |change| change < -*threshold)
            }
            Self::RangeCompressionBelow {
                atr_period,
                lookback,
                threshold,
            } => features::compression_ratio(bars, *atr_period, *lookback)
                .map_or(false, |ratio| ratio < *threshold),
            Self::VolumeSpikeAbove { lookback, multiplier } => {
                match (bars.last(), features::mean_volume(bars, *lookback)) {
                    (Some(last), Some(mean)) if mean > 0.0 => last.volume > mean * multiplier,
                    _ => false,
                }
            }
            Self::SessionWindow { start_hour, end_hour } => bars.last().map_or(false, |last| {
                use chrono::Timelike;
                let hour = last.timestamp.hour();
                if start_hour <= end_hour {
                    (*start_hour..*end_hour).contains(&hour)
                } else {
                    hour >= *start_hour || hour < *end_hour
                }
            }),
            Self::All(inner) => inner.iter().all(|predicate| predicate.evaluate(bars)),
            Self::Any(inner) => inner.iter().any(|predicate| predicate.evaluate(bars)),
        }
    }
}

fn change_over(bars: &[Bar], lookback: usize) -> Option<f64> {
    if lookback == 0 || bars.len() <= lookback {
        return None;
    }
    let past = &bars[bars.len() - 1 - lookback];
    let last = bars.last()?;
    if past.close == 0.0 {
        return None;
    }
    Some((last.close - past.close) / past.close)
}

/// Declarative description of a discovered strategy.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventDefinition {
    pub strategy_id: StrategyId,
    pub tier: WitnessTier,
    pub claim_type: ClaimType,
    pub direction: Option<Direction>,
    pub confidence: f64,
    pub validity_window_secs: i64,
    pub predicate: BarPredicate,
}

/// Concrete witness evaluating an [`EventDefinition`] on every bar window.
pub struct EventDefinitionWitness {
    descriptor: WitnessDescriptor,
    definition: EventDefinition,
}

impl EventDefinitionWitness {
    /// Build a witness from a definition. The veto tier is reserved for
    /// hand-written sentinels and cannot be synthesized.
    pub fn new(definition: EventDefinition) -> WitnessResult<Self> {
        if definition.tier == WitnessTier::Veto {
            return Err(WitnessError::InvalidConfig(
                "event definitions cannot target the veto tier".into(),
            ));
        }
        if !definition.tier.allows(definition.claim_type) {
            return Err(WitnessError::InvalidConfig(format!(
                "tier {} may not emit {:?}",
                definition.tier, definition.claim_type
            )));
        }
        if !(0.0..=1.0).contains(&definition.confidence) {
            return Err(WitnessError::InvalidConfig(
                "confidence must lie in [0, 1]".into(),
            ));
        }
        let descriptor = WitnessDescriptor::new(
            definition.strategy_id.clone(),
            definition.tier,
            definition.validity_window_secs,
            vec![definition.claim_type],
            definition.direction.is_some(),
        );
        Ok(Self {
            descriptor,
            definition,
        })
    }

    #[must_use]
    pub fn definition(&self) -> &EventDefinition {
        &self.definition
    }
}

impl Witness for EventDefinitionWitness {
    fn descriptor(&self) -> &WitnessDescriptor {
        &self.descriptor
    }

    fn configure(&mut self, params: toml::Value) -> WitnessResult<()> {
        let definition: EventDefinition = params.try_into().map_err(|err: toml::de::Error| {
            WitnessError::InvalidConfig(format!("failed to parse event definition: {err}"))
        })?;
        let rebuilt = Self::new(definition)?;
        self.descriptor = rebuilt.descriptor;
        self.definition = rebuilt.definition;
        Ok(())
    }

    fn generate_claim(&mut self, bars: &[Bar]) -> WitnessResult<Option<verdict_core::Claim>> {
        let Some(last) = bars.last() else {
            return Ok(None);
        };
        if !self.definition.predicate.evaluate(bars) {
            return Ok(None);
        }
        let mut constraints = serde_json::Map::new();
        constraints.insert(
            "signal_type".to_string(),
            serde_json::Value::String(self.definition.strategy_id.clone()),
        );
        Ok(Some(self.descriptor.claim(
            self.definition.claim_type,
            self.definition.confidence,
            self.definition.direction,
            constraints,
            last.timestamp,
        )))
    }
}

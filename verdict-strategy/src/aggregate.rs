//! Claim aggregation: resolves one loop's claim set into a tradeable
//! direction with total confidence, or a refusal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use verdict_core::{AggregatedVerdict, Claim, ClaimType, ResolutionReason, WitnessTier};

/// Hard ceiling on total confidence; no signal is ever treated as certain.
pub const CONFIDENCE_CEILING: f64 = 0.95;

/// Opposing claims contribute at half strength so weak disagreement cannot
/// fully cancel strong agreement.
const OPPOSITION_DAMPING: f64 = 0.5;

/// Relative confidence window within which opposed core claims make the
/// regime unreadable.
const REGIME_UNCLEAR_WINDOW: f64 = 0.10;

/// Read-time view of effective witness weights. Implementations must return
/// a value stable for the duration of one aggregation.
pub trait WeightSource: Send + Sync {
    /// Effective weight (base × health × learning) for a strategy, with the
    /// neutral fallback of 1.0 for unknown ids.
    fn effective_weight(&self, strategy_id: &str) -> f64;
}

impl WeightSource for HashMap<String, f64> {
    fn effective_weight(&self, strategy_id: &str) -> f64 {
        self.get(strategy_id).copied().unwrap_or(1.0)
    }
}

/// Combines claims into a single [`AggregatedVerdict`] once per loop.
pub struct Aggregator {
    tier2_base_factor: f64,
    confidence_threshold: f64,
    expired_dropped: AtomicU64,
}

impl Aggregator {
    #[must_use]
    pub fn new(tier2_base_factor: f64, confidence_threshold: f64) -> Self {
        Self {
            tier2_base_factor,
            confidence_threshold,
            expired_dropped: AtomicU64::new(0),
        }
    }

    /// Claims dropped so far because their validity window had passed.
    #[must_use]
    pub fn expired_claim_count(&self) -> u64 {
        self.expired_dropped.load(Ordering::Relaxed)
    }

    /// Resolve a claim set. Orderings are explicit: expiry filter, veto
    /// short-circuit, dominant selection, conflict refusal, weighted
    /// support, ceiling clamp, threshold.
    pub fn aggregate(
        &self,
        claims: &[Claim],
        now: DateTime<Utc>,
        weights: &dyn WeightSource,
    ) -> AggregatedVerdict {
        let live: Vec<&Claim> = claims
            .iter()
            .filter(|claim| {
                if claim.is_expired(now) {
                    self.expired_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(strategy = %claim.strategy_id, "expired claim dropped");
                    false
                } else {
                    true
                }
            })
            .collect();

        if live.is_empty() {
            return AggregatedVerdict::refusal(ResolutionReason::NoClaims, "no_claims");
        }

        // A veto-tier claim blocks the loop unconditionally.
        if let Some(veto) = live
            .iter()
            .find(|claim| claim.claim_type == ClaimType::ExecutionVeto)
        {
            info!(strategy = %veto.strategy_id, "execution vetoed");
            let mut verdict = AggregatedVerdict::refusal(
                ResolutionReason::Vetoed,
                format!("vetoed_by_{}", veto.strategy_id),
            );
            verdict.veto_strategy_id = Some(veto.strategy_id.clone());
            return verdict;
        }

        // Dominant: highest-confidence directional core claim asserting
        // market eligibility; ties break lexicographically by id.
        let mut candidates: Vec<&&Claim> = live
            .iter()
            .filter(|claim| {
                claim.tier == WitnessTier::Core
                    && claim.claim_type == ClaimType::MarketEligible
                    && claim.direction.is_some()
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.strategy_id.cmp(&b.strategy_id))
        });
        let Some(dominant) = candidates.first().copied().copied() else {
            return AggregatedVerdict::refusal(
                ResolutionReason::NoEligibleClaims,
                "no_eligible_claims",
            );
        };
        let dominant_direction = dominant.direction.expect("dominant is directional");

        // Two near-equal opposed core claims make the regime unreadable.
        for claim in candidates.iter().skip(1) {
            let Some(direction) = claim.direction else {
                continue;
            };
            if direction == dominant_direction {
                continue;
            }
            let larger = dominant.confidence.max(claim.confidence);
            if larger <= 0.0 {
                continue;
            }
            if (dominant.confidence - claim.confidence).abs() <= REGIME_UNCLEAR_WINDOW * larger {
                info!(
                    dominant = %dominant.strategy_id,
                    opposed = %claim.strategy_id,
                    "core direction conflict; refusing"
                );
                return AggregatedVerdict::refusal(
                    ResolutionReason::RegimeUnclear,
                    "tier1_direction_conflict",
                );
            }
        }

        let mut total = dominant.confidence;
        for claim in &live {
            if claim.strategy_id == dominant.strategy_id {
                continue;
            }
            let Some(direction) = claim.direction else {
                continue;
            };
            let factor = weights.effective_weight(&claim.strategy_id) * self.tier2_base_factor;
            if direction == dominant_direction {
                total += claim.confidence * factor;
            } else {
                total -= claim.confidence * factor * OPPOSITION_DAMPING;
            }
        }

        let total = total.clamp(0.0, CONFIDENCE_CEILING);
        let is_tradeable = total >= self.confidence_threshold;
        AggregatedVerdict {
            dominant_direction: Some(dominant_direction),
            dominant_strategy_id: Some(dominant.strategy_id.clone()),
            total_confidence: total,
            is_tradeable,
            veto_strategy_id: None,
            resolution: ResolutionReason::DominantSelected,
            reason: if is_tradeable {
                "dominant_selected".to_string()
            } else {
                "confidence_below_threshold".to_string()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use verdict_core::Direction;

    fn claim(
        id: &str,
        tier: WitnessTier,
        claim_type: ClaimType,
        confidence: f64,
        direction: Option<Direction>,
        ts: DateTime<Utc>,
    ) -> Claim {
        Claim {
            strategy_id: id.into(),
            tier,
            claim_type,
            confidence,
            validity_window_secs: 60,
            direction,
            constraints: serde_json::Map::new(),
            timestamp: ts,
        }
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(0.1, 0.6)
    }

    fn unit_weights() -> HashMap<String, f64> {
        HashMap::new()
    }

    #[test]
    fn veto_short_circuits_everything() {
        let now = Utc::now();
        let claims = vec![
            claim("w1", WitnessTier::Core, ClaimType::MarketEligible, 0.9, Some(Direction::Long), now),
            claim("w2", WitnessTier::Auxiliary, ClaimType::RegimeMatched, 0.8, Some(Direction::Long), now),
            claim("w3", WitnessTier::Veto, ClaimType::ExecutionVeto, 1.0, None, now),
        ];
        let verdict = aggregator().aggregate(&claims, now, &unit_weights());
        assert!(!verdict.is_tradeable);
        assert_eq!(verdict.resolution, ResolutionReason::Vetoed);
        assert_eq!(verdict.veto_strategy_id.as_deref(), Some("w3"));
    }

    #[test]
    fn weighted_agreement_adds_support() {
        let now = Utc::now();
        let claims = vec![
            claim("w1", WitnessTier::Core, ClaimType::MarketEligible, 0.7, Some(Direction::Long), now),
            claim("w2", WitnessTier::Auxiliary, ClaimType::RegimeMatched, 0.5, Some(Direction::Long), now),
        ];
        let mut weights = HashMap::new();
        weights.insert("w2".to_string(), 1.0);
        let verdict = aggregator().aggregate(&claims, now, &weights);
        assert!(verdict.is_tradeable);
        assert!((verdict.total_confidence - 0.75).abs() < 1e-9);
        assert_eq!(verdict.dominant_direction, Some(Direction::Long));
    }

    #[test]
    fn opposition_is_damped_by_half() {
        let now = Utc::now();
        let claims = vec![
            claim("w1", WitnessTier::Core, ClaimType::MarketEligible, 0.7, Some(Direction::Long), now),
            claim("w2", WitnessTier::Auxiliary, ClaimType::RegimeMatched, 0.6, Some(Direction::Short), now),
        ];
        let mut weights = HashMap::new();
        weights.insert("w2".to_string(), 1.0);
        let verdict = aggregator().aggregate(&claims, now, &weights);
        assert!((verdict.total_confidence - 0.67).abs() < 1e-9);
        assert!(verdict.is_tradeable);
        assert_eq!(verdict.dominant_direction, Some(Direction::Long));
    }

    #[test]
    fn near_equal_opposed_core_claims_refuse() {
        let now = Utc::now();
        let claims = vec![
            claim("w1", WitnessTier::Core, ClaimType::MarketEligible, 0.72, Some(Direction::Long), now),
            claim("w2", WitnessTier::Core, ClaimType::MarketEligible, 0.70, Some(Direction::Short), now),
        ];
        let verdict = aggregator().aggregate(&claims, now, &unit_weights());
        assert!(!verdict.is_tradeable);
        assert_eq!(verdict.resolution, ResolutionReason::RegimeUnclear);
    }

    #[test]
    fn clearly_separated_opposed_core_claims_resolve() {
        let now = Utc::now();
        let claims = vec![
            claim("w1", WitnessTier::Core, ClaimType::MarketEligible, 0.9, Some(Direction::Long), now),
            claim("w2", WitnessTier::Core, ClaimType::MarketEligible, 0.5, Some(Direction::Short), now),
        ];
        let verdict = aggregator().aggregate(&claims, now, &unit_weights());
        assert_eq!(verdict.resolution, ResolutionReason::DominantSelected);
        assert_eq!(verdict.dominant_strategy_id.as_deref(), Some("w1"));
        // 0.9 - 0.5 * 0.1 * 0.5 = 0.875
        assert!((verdict.total_confidence - 0.875).abs() < 1e-9);
    }

    #[test]
    fn ties_break_lexicographically() {
        let now = Utc::now();
        let claims = vec![
            claim("w-b", WitnessTier::Core, ClaimType::MarketEligible, 0.8, Some(Direction::Long), now),
            claim("w-a", WitnessTier::Core, ClaimType::MarketEligible, 0.8, Some(Direction::Long), now),
        ];
        let verdict = aggregator().aggregate(&claims, now, &unit_weights());
        assert_eq!(verdict.dominant_strategy_id.as_deref(), Some("w-a"));
    }

    #[test]
    fn expired_claims_are_ignored_and_counted() {
        let now = Utc::now();
        let stale = now - Duration::seconds(120);
        let claims = vec![claim(
            "w1",
            WitnessTier::Core,
            ClaimType::MarketEligible,
            0.9,
            Some(Direction::Long),
            stale,
        )];
        let agg = aggregator();
        let verdict = agg.aggregate(&claims, now, &unit_weights());
        assert_eq!(verdict.resolution, ResolutionReason::NoClaims);
        assert_eq!(agg.expired_claim_count(), 1);
    }

    #[test]
    fn total_confidence_is_capped_below_certainty() {
        let now = Utc::now();
        let mut claims = vec![claim(
            "w1",
            WitnessTier::Core,
            ClaimType::MarketEligible,
            0.9,
            Some(Direction::Long),
            now,
        )];
        for i in 0..10 {
            claims.push(claim(
                &format!("aux-{i}"),
                WitnessTier::Auxiliary,
                ClaimType::RegimeMatched,
                0.9,
                Some(Direction::Long),
                now,
            ));
        }
        let mut weights = HashMap::new();
        for i in 0..10 {
            weights.insert(format!("aux-{i}"), 2.88);
        }
        let verdict = aggregator().aggregate(&claims, now, &weights);
        assert!(verdict.total_confidence <= CONFIDENCE_CEILING);
        assert_eq!(verdict.total_confidence, CONFIDENCE_CEILING);
    }
}

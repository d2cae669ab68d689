//! Regime domain: extreme volatility and regime-advised exposure caps.

use verdict_core::{RiskEventType, RiskLevel};

use crate::context::{RiskContext, RiskThresholds};

use super::{CheckerReport, RiskChecker, RiskEvent};

pub struct RegimeChecker {
    thresholds: RiskThresholds,
}

impl RegimeChecker {
    #[must_use]
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }
}

impl RiskChecker for RegimeChecker {
    fn name(&self) -> &'static str {
        "regime"
    }

    fn check(&self, context: &RiskContext) -> CheckerReport {
        let move_pct = context.last_bar_change_pct.abs();
        if move_pct >= self.thresholds.extreme_volatility {
            let event = RiskEvent::new(
                RiskEventType::VolatilitySpike,
                RiskLevel::Cooldown,
                "extreme bar move",
                move_pct,
                self.thresholds.extreme_volatility,
            );
            return CheckerReport::deny(
                self.name(),
                RiskLevel::Cooldown,
                format!("bar moved {:.2}%", move_pct * 100.0),
            )
            .with_events(vec![event]);
        }

        if let Some(cap) = context.regime_max_position_pct {
            if context.requested_position_pct > cap {
                let event = RiskEvent::new(
                    RiskEventType::PositionLimit,
                    RiskLevel::Warning,
                    "request beyond the regime cap",
                    context.requested_position_pct,
                    cap,
                );
                return CheckerReport::deny(
                    self.name(),
                    RiskLevel::Warning,
                    format!(
                        "requested {:.2}% above regime cap {:.2}%",
                        context.requested_position_pct * 100.0,
                        cap * 100.0
                    ),
                )
                .with_events(vec![event]);
            }
        }

        CheckerReport::approve(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> RegimeChecker {
        RegimeChecker::new(RiskThresholds::default())
    }

    #[test]
    fn extreme_bar_move_cools_down() {
        let context = RiskContext {
            last_bar_change_pct: -0.12,
            ..RiskContext::default()
        };
        let report = checker().check(&context);
        assert_eq!(report.level, RiskLevel::Cooldown);
        assert!(!report.approved);
    }

    #[test]
    fn regime_cap_bounds_requests() {
        let context = RiskContext {
            requested_position_pct: 0.04,
            regime_max_position_pct: Some(0.02),
            ..RiskContext::default()
        };
        let report = checker().check(&context);
        assert_eq!(report.level, RiskLevel::Warning);
        assert!(!report.approved);
    }
}

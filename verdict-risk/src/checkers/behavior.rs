//! Behavior domain: position sizing discipline and leverage.

use verdict_core::{RiskEventType, RiskLevel};

use crate::context::{RiskContext, RiskThresholds};

use super::{CheckerReport, RiskChecker, RiskEvent};

pub struct BehaviorChecker {
    thresholds: RiskThresholds,
}

impl BehaviorChecker {
    #[must_use]
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }
}

impl RiskChecker for BehaviorChecker {
    fn name(&self) -> &'static str {
        "behavior"
    }

    fn check(&self, context: &RiskContext) -> CheckerReport {
        let t = &self.thresholds;

        if context.requested_position_pct > t.max_single_position {
            let event = RiskEvent::new(
                RiskEventType::PositionLimit,
                RiskLevel::Warning,
                "single position above limit",
                context.requested_position_pct,
                t.max_single_position,
            );
            return CheckerReport::deny(
                self.name(),
                RiskLevel::Warning,
                format!(
                    "single position {:.2}% > {:.2}%",
                    context.requested_position_pct * 100.0,
                    t.max_single_position * 100.0
                ),
            )
            .with_events(vec![event]);
        }

        let total = context.current_position_pct + context.requested_position_pct;
        if total > t.max_total_position {
            let event = RiskEvent::new(
                RiskEventType::PositionLimit,
                RiskLevel::Cooldown,
                "total exposure above limit",
                total,
                t.max_total_position,
            );
            return CheckerReport::deny(
                self.name(),
                RiskLevel::Cooldown,
                format!(
                    "total exposure {:.2}% > {:.2}%",
                    total * 100.0,
                    t.max_total_position * 100.0
                ),
            )
            .with_events(vec![event]);
        }

        if context.requested_leverage > t.max_leverage {
            let event = RiskEvent::new(
                RiskEventType::LeverageLimit,
                RiskLevel::Cooldown,
                "leverage above limit",
                context.requested_leverage,
                t.max_leverage,
            );
            return CheckerReport::deny(
                self.name(),
                RiskLevel::Cooldown,
                format!(
                    "leverage {:.1}x > {:.1}x",
                    context.requested_leverage, t.max_leverage
                ),
            )
            .with_events(vec![event]);
        }

        CheckerReport::approve(self.name())
    }
}

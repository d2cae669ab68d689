//! Account survival domain: drawdown, daily/weekly loss, loss streaks.

use verdict_core::{RiskEventType, RiskLevel};

use crate::context::{RiskContext, RiskThresholds};

use super::{CheckerReport, RiskChecker, RiskEvent};

pub struct AccountSurvivalChecker {
    thresholds: RiskThresholds,
}

impl AccountSurvivalChecker {
    #[must_use]
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }
}

impl RiskChecker for AccountSurvivalChecker {
    fn name(&self) -> &'static str {
        "account_survival"
    }

    fn check(&self, context: &RiskContext) -> CheckerReport {
        let t = &self.thresholds;

        if context.drawdown >= t.max_drawdown {
            let event = RiskEvent::new(
                RiskEventType::DrawdownExceeded,
                RiskLevel::RiskLocked,
                "max drawdown breached",
                context.drawdown,
                t.max_drawdown,
            );
            return CheckerReport::deny(
                self.name(),
                RiskLevel::RiskLocked,
                format!("drawdown {:.2}% >= {:.2}%", context.drawdown * 100.0, t.max_drawdown * 100.0),
            )
            .with_events(vec![event]);
        }

        let weekly_loss = context.weekly_loss_ratio();
        if weekly_loss >= t.weekly_max_loss {
            let event = RiskEvent::new(
                RiskEventType::WeeklyLossExceeded,
                RiskLevel::RiskLocked,
                "weekly loss limit breached",
                weekly_loss,
                t.weekly_max_loss,
            );
            return CheckerReport::deny(
                self.name(),
                RiskLevel::RiskLocked,
                format!("weekly loss {:.2}% >= {:.2}%", weekly_loss * 100.0, t.weekly_max_loss * 100.0),
            )
            .with_events(vec![event]);
        }

        let daily_loss = context.daily_loss_ratio();
        if daily_loss >= t.daily_max_loss {
            let event = RiskEvent::new(
                RiskEventType::DailyLossExceeded,
                RiskLevel::Cooldown,
                "daily loss limit breached",
                daily_loss,
                t.daily_max_loss,
            );
            return CheckerReport::deny(
                self.name(),
                RiskLevel::Cooldown,
                format!("daily loss {:.2}% >= {:.2}%", daily_loss * 100.0, t.daily_max_loss * 100.0),
            )
            .with_events(vec![event]);
        }

        if context.consecutive_losses >= t.consecutive_loss_limit {
            let event = RiskEvent::new(
                RiskEventType::ConsecutiveLoss,
                RiskLevel::Cooldown,
                "consecutive loss streak",
                f64::from(context.consecutive_losses),
                f64::from(t.consecutive_loss_limit),
            );
            return CheckerReport::deny(
                self.name(),
                RiskLevel::Cooldown,
                format!(
                    "{} consecutive losses >= {}",
                    context.consecutive_losses, t.consecutive_loss_limit
                ),
            )
            .with_events(vec![event]);
        }

        CheckerReport::approve(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> AccountSurvivalChecker {
        AccountSurvivalChecker::new(RiskThresholds::default())
    }

    #[test]
    fn drawdown_breach_locks() {
        let context = RiskContext {
            drawdown: 0.25,
            ..RiskContext::default()
        };
        let report = checker().check(&context);
        assert!(!report.approved);
        assert_eq!(report.level, RiskLevel::RiskLocked);
    }

    #[test]
    fn daily_loss_cools_down() {
        let context = RiskContext {
            daily_pnl: -400.0, // 4% of 10k
            ..RiskContext::default()
        };
        let report = checker().check(&context);
        assert!(!report.approved);
        assert_eq!(report.level, RiskLevel::Cooldown);
    }

    #[test]
    fn loss_streak_cools_down() {
        let context = RiskContext {
            consecutive_losses: 3,
            ..RiskContext::default()
        };
        let report = checker().check(&context);
        assert!(!report.approved);
        assert_eq!(report.level, RiskLevel::Cooldown);
    }

    #[test]
    fn healthy_account_approves() {
        let report = checker().check(&RiskContext::default());
        assert!(report.approved);
        assert_eq!(report.level, RiskLevel::Normal);
    }
}

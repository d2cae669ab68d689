//! System domain: data freshness and heartbeat.

use chrono::Duration;

use verdict_core::{RiskEventType, RiskLevel};

use crate::context::{RiskContext, RiskThresholds};

use super::{CheckerReport, RiskChecker, RiskEvent};

pub struct SystemChecker {
    thresholds: RiskThresholds,
}

impl SystemChecker {
    #[must_use]
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }
}

impl RiskChecker for SystemChecker {
    fn name(&self) -> &'static str {
        "system"
    }

    fn check(&self, context: &RiskContext) -> CheckerReport {
        let t = &self.thresholds;

        if context.data_delay_ms > t.max_data_delay_ms {
            let event = RiskEvent::new(
                RiskEventType::DataStale,
                RiskLevel::Warning,
                "market data delayed",
                context.data_delay_ms as f64,
                t.max_data_delay_ms as f64,
            );
            return CheckerReport::deny(
                self.name(),
                RiskLevel::Warning,
                format!("data delayed {}ms", context.data_delay_ms),
            )
            .with_events(vec![event]);
        }

        if let Some(heartbeat) = context.last_heartbeat {
            let age = context.now - heartbeat;
            if age > Duration::seconds(t.heartbeat_timeout_secs as i64) {
                let event = RiskEvent::new(
                    RiskEventType::DataStale,
                    RiskLevel::Cooldown,
                    "stale heartbeat",
                    age.num_seconds() as f64,
                    t.heartbeat_timeout_secs as f64,
                );
                return CheckerReport::deny(
                    self.name(),
                    RiskLevel::Cooldown,
                    format!("heartbeat {}s old", age.num_seconds()),
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
    use chrono::Utc;

    fn checker() -> SystemChecker {
        SystemChecker::new(RiskThresholds::default())
    }

    #[test]
    fn delayed_data_warns() {
        let context = RiskContext {
            data_delay_ms: 8000,
            ..RiskContext::default()
        };
        let report = checker().check(&context);
        assert_eq!(report.level, RiskLevel::Warning);
    }

    #[test]
    fn stale_heartbeat_cools_down() {
        let now = Utc::now();
        let context = RiskContext {
            last_heartbeat: Some(now - Duration::seconds(120)),
            now,
            ..RiskContext::default()
        };
        let report = checker().check(&context);
        assert_eq!(report.level, RiskLevel::Cooldown);
        assert!(!report.approved);
    }

    #[test]
    fn fresh_system_approves() {
        let now = Utc::now();
        let context = RiskContext {
            last_heartbeat: Some(now - Duration::seconds(5)),
            now,
            ..RiskContext::default()
        };
        assert!(checker().check(&context).approved);
    }
}

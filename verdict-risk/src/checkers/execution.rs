//! Execution integrity domain: slippage, fill rates, latency.

use verdict_core::{RiskEventType, RiskLevel};

use crate::context::{RiskContext, RiskThresholds};

use super::{CheckerReport, RiskChecker, RiskEvent};

pub struct ExecutionIntegrityChecker {
    thresholds: RiskThresholds,
}

impl ExecutionIntegrityChecker {
    #[must_use]
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl RiskChecker for ExecutionIntegrityChecker {
    fn name(&self) -> &'static str {
        "execution_integrity"
    }

    fn check(&self, context: &RiskContext) -> CheckerReport {
        let t = &self.thresholds;
        let mut events = Vec::new();
        let mut breaches = 0usize;

        if let Some(slippage) = mean(&context.recent_slippages) {
            if slippage > t.max_slippage {
                breaches += 1;
                events.push(RiskEvent::new(
                    RiskEventType::ExecutionFailure,
                    RiskLevel::Warning,
                    "mean slippage above limit",
                    slippage,
                    t.max_slippage,
                ));
            }
        }

        if let Some(fill_rate) = mean(&context.recent_fill_rates) {
            if fill_rate < t.min_fill_rate {
                breaches += 1;
                events.push(RiskEvent::new(
                    RiskEventType::ExecutionFailure,
                    RiskLevel::Warning,
                    "fill rate below limit",
                    fill_rate,
                    t.min_fill_rate,
                ));
            }
        }

        if !context.recent_latencies_ms.is_empty() {
            let latency = context.recent_latencies_ms.iter().copied().sum::<u64>() as f64
                / context.recent_latencies_ms.len() as f64;
            if latency > t.max_latency_ms as f64 {
                breaches += 1;
                events.push(RiskEvent::new(
                    RiskEventType::ExecutionFailure,
                    RiskLevel::Warning,
                    "mean order latency above limit",
                    latency,
                    t.max_latency_ms as f64,
                ));
            }
        }

        match breaches {
            0 => CheckerReport::approve(self.name()),
            1 => CheckerReport::deny(self.name(), RiskLevel::Warning, "execution quality degraded")
                .with_events(events),
            _ => CheckerReport::deny(
                self.name(),
                RiskLevel::Cooldown,
                "execution quality degraded on multiple axes",
            )
            .with_events(events),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> ExecutionIntegrityChecker {
        ExecutionIntegrityChecker::new(RiskThresholds::default())
    }

    #[test]
    fn clean_telemetry_approves() {
        let context = RiskContext {
            recent_slippages: vec![0.001, 0.002],
            recent_fill_rates: vec![0.99, 1.0],
            recent_latencies_ms: vec![120, 200],
            ..RiskContext::default()
        };
        assert!(checker().check(&context).approved);
    }

    #[test]
    fn single_breach_warns() {
        let context = RiskContext {
            recent_slippages: vec![0.02],
            ..RiskContext::default()
        };
        let report = checker().check(&context);
        assert!(!report.approved);
        assert_eq!(report.level, RiskLevel::Warning);
    }

    #[test]
    fn compound_breach_cools_down() {
        let context = RiskContext {
            recent_slippages: vec![0.02],
            recent_latencies_ms: vec![5000],
            ..RiskContext::default()
        };
        let report = checker().check(&context);
        assert_eq!(report.level, RiskLevel::Cooldown);
    }
}

//! Mapping from the layered configuration surface onto component settings.

use std::time::Duration as StdDuration;

use chrono::Duration;

use verdict_config::AppConfig;
use verdict_executor::FanoutSettings;
use verdict_risk::{CooldownDurations, RiskThresholds};
use verdict_strategy::weight::WeightClamps;

use crate::loop_runner::LoopSettings;

/// Component-level settings derived from one [`AppConfig`].
#[derive(Clone, Copy, Debug)]
pub struct ComponentSettings {
    pub tier2_base_factor: f64,
    pub confidence_threshold: f64,
    pub weight_clamps: WeightClamps,
    pub risk_thresholds: RiskThresholds,
    pub cooldowns: CooldownDurations,
    pub fanout: FanoutSettings,
    pub loop_settings: LoopSettings,
}

/// Translate the configuration surface into the structs each component
/// consumes. Risk thresholds were already validated against their hard
/// ranges at load time.
#[must_use]
pub fn component_settings(config: &AppConfig) -> ComponentSettings {
    let weight_clamps = WeightClamps {
        base_min: config.weights.base_min,
        base_max: config.weights.base_max,
        health_min: config.weights.health_min,
        health_max: config.weights.health_max,
        learning_min: config.weights.learning_min,
        learning_max: config.weights.learning_max,
        learning_daily_drift: config.weights.learning_daily_drift,
    };
    let risk_thresholds = RiskThresholds {
        max_drawdown: config.risk.max_drawdown,
        daily_max_loss: config.risk.daily_max_loss,
        weekly_max_loss: config.risk.weekly_max_loss,
        consecutive_loss_limit: config.risk.consecutive_loss_limit,
        max_single_position: config.risk.max_single_position,
        max_total_position: config.risk.max_total_position,
        max_leverage: config.risk.max_leverage,
        max_slippage: config.risk.max_slippage,
        min_fill_rate: config.risk.min_fill_rate,
        max_latency_ms: config.risk.max_latency_ms,
        extreme_volatility: config.risk.extreme_volatility,
        max_data_delay_ms: config.risk.max_data_delay_ms,
        heartbeat_timeout_secs: config.risk.heartbeat_timeout_secs,
    };
    let fanout = FanoutSettings {
        decision_deadline: StdDuration::from_secs(config.execution.fanout_deadline_secs),
        order_call_timeout: StdDuration::from_secs(config.execution.order_call_timeout_secs),
    };
    let loop_settings = LoopSettings {
        panel_budget: StdDuration::from_millis(config.execution.panel_budget_ms),
        cooldown: Duration::seconds(config.cooldowns.normal_secs as i64),
        ..LoopSettings::default()
    };
    ComponentSettings {
        tier2_base_factor: config.aggregation.tier2_base_factor,
        confidence_threshold: config.aggregation.confidence_threshold,
        weight_clamps,
        risk_thresholds,
        cooldowns: CooldownDurations {
            normal_secs: config.cooldowns.normal_secs,
            stop_loss_secs: config.cooldowns.stop_loss_secs,
            consecutive_loss_secs: config.cooldowns.consecutive_loss_secs,
        },
        fanout,
        loop_settings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_through_unchanged() {
        let settings = component_settings(&AppConfig::default());
        assert_eq!(settings.tier2_base_factor, 0.1);
        assert_eq!(settings.confidence_threshold, 0.6);
        assert_eq!(settings.weight_clamps.base_max, 2.0);
        assert_eq!(settings.risk_thresholds.max_drawdown, 0.20);
        assert_eq!(settings.fanout.decision_deadline.as_secs(), 30);
        assert_eq!(settings.cooldowns.consecutive_loss_secs, 3600);
        assert_eq!(settings.loop_settings.cooldown.num_seconds(), 600);
    }
}

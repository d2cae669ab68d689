//! Layered configuration for the decision core.
//!
//! Operator-owned risk thresholds live here. They are validated against hard
//! ranges on load; nothing else in the workspace may widen them at runtime,
//! and the learning layer is never handed a setter for them.

use std::path::Path;

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a loaded threshold escapes its permitted range.
#[derive(Debug, Error)]
#[error("{name} = {value} outside permitted range [{min}, {max}]")]
pub struct ThresholdOutOfRange {
    pub name: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Root application configuration deserialized from layered sources.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub weights: WeightClampConfig,
    #[serde(default)]
    pub risk: RiskThresholdConfig,
    #[serde(default)]
    pub cooldowns: CooldownConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Aggregator constants.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AggregationConfig {
    #[serde(default = "default_tier2_base_factor")]
    pub tier2_base_factor: f64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            tier2_base_factor: default_tier2_base_factor(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// Clamp ranges for the three weight components.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct WeightClampConfig {
    #[serde(default = "default_base_weight_min")]
    pub base_min: f64,
    #[serde(default = "default_base_weight_max")]
    pub base_max: f64,
    #[serde(default = "default_health_factor_min")]
    pub health_min: f64,
    #[serde(default = "default_health_factor_max")]
    pub health_max: f64,
    #[serde(default = "default_learning_factor_min")]
    pub learning_min: f64,
    #[serde(default = "default_learning_factor_max")]
    pub learning_max: f64,
    /// Maximum absolute movement of the learning factor within one UTC day.
    #[serde(default = "default_learning_daily_drift")]
    pub learning_daily_drift: f64,
}

impl Default for WeightClampConfig {
    fn default() -> Self {
        Self {
            base_min: default_base_weight_min(),
            base_max: default_base_weight_max(),
            health_min: default_health_factor_min(),
            health_max: default_health_factor_max(),
            learning_min: default_learning_factor_min(),
            learning_max: default_learning_factor_max(),
            learning_daily_drift: default_learning_daily_drift(),
        }
    }
}

/// Operator-owned risk thresholds (hard floors, not learnable).
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RiskThresholdConfig {
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: f64,
    #[serde(default = "default_daily_max_loss")]
    pub daily_max_loss: f64,
    #[serde(default = "default_weekly_max_loss")]
    pub weekly_max_loss: f64,
    #[serde(default = "default_consecutive_loss_limit")]
    pub consecutive_loss_limit: u32,
    #[serde(default = "default_max_single_position")]
    pub max_single_position: f64,
    #[serde(default = "default_max_total_position")]
    pub max_total_position: f64,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: f64,
    #[serde(default = "default_max_slippage")]
    pub max_slippage: f64,
    #[serde(default = "default_min_fill_rate")]
    pub min_fill_rate: f64,
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
    #[serde(default = "default_extreme_volatility")]
    pub extreme_volatility: f64,
    #[serde(default = "default_max_data_delay_ms")]
    pub max_data_delay_ms: u64,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for RiskThresholdConfig {
    fn default() -> Self {
        Self {
            max_drawdown: default_max_drawdown(),
            daily_max_loss: default_daily_max_loss(),
            weekly_max_loss: default_weekly_max_loss(),
            consecutive_loss_limit: default_consecutive_loss_limit(),
            max_single_position: default_max_single_position(),
            max_total_position: default_max_total_position(),
            max_leverage: default_max_leverage(),
            max_slippage: default_max_slippage(),
            min_fill_rate: default_min_fill_rate(),
            max_latency_ms: default_max_latency_ms(),
            extreme_volatility: default_extreme_volatility(),
            max_data_delay_ms: default_max_data_delay_ms(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

impl RiskThresholdConfig {
    /// Validate every threshold against its permitted operating range.
    pub fn validate(&self) -> Result<(), ThresholdOutOfRange> {
        check("max_drawdown", self.max_drawdown, 0.05, 0.30)?;
        check("daily_max_loss", self.daily_max_loss, 0.01, 0.10)?;
        check("weekly_max_loss", self.weekly_max_loss, 0.03, 0.20)?;
        check(
            "consecutive_loss_limit",
            f64::from(self.consecutive_loss_limit),
            2.0,
            5.0,
        )?;
        check("max_single_position", self.max_single_position, 0.01, 0.10)?;
        check("max_total_position", self.max_total_position, 0.10, 0.50)?;
        check("max_leverage", self.max_leverage, 1.0, 10.0)?;
        check("max_slippage", self.max_slippage, 0.001, 0.01)?;
        Ok(())
    }
}

fn check(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ThresholdOutOfRange> {
    if value < min || value > max {
        return Err(ThresholdOutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Cooldown durations applied after trading activity or risk events.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct CooldownConfig {
    #[serde(default = "default_normal_cooldown_secs")]
    pub normal_secs: u64,
    #[serde(default = "default_stop_loss_cooldown_secs")]
    pub stop_loss_secs: u64,
    #[serde(default = "default_consecutive_loss_cooldown_secs")]
    pub consecutive_loss_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            normal_secs: default_normal_cooldown_secs(),
            stop_loss_secs: default_stop_loss_cooldown_secs(),
            consecutive_loss_secs: default_consecutive_loss_cooldown_secs(),
        }
    }
}

/// Deadlines governing the per-user fan-out.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Overall deadline for one decision's fan-out across all users.
    #[serde(default = "default_fanout_deadline_secs")]
    pub fanout_deadline_secs: u64,
    /// Deadline applied to each individual exchange call.
    #[serde(default = "default_order_call_timeout_secs")]
    pub order_call_timeout_secs: u64,
    /// Time budget the witness panel gets per loop, in milliseconds.
    #[serde(default = "default_panel_budget_ms")]
    pub panel_budget_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fanout_deadline_secs: default_fanout_deadline_secs(),
            order_call_timeout_secs: default_order_call_timeout_secs(),
            panel_budget_ms: default_panel_budget_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tier2_base_factor() -> f64 {
    0.1
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_base_weight_min() -> f64 {
    0.5
}

fn default_base_weight_max() -> f64 {
    2.0
}

fn default_health_factor_min() -> f64 {
    0.5
}

fn default_health_factor_max() -> f64 {
    1.2
}

fn default_learning_factor_min() -> f64 {
    0.8
}

fn default_learning_factor_max() -> f64 {
    1.2
}

fn default_learning_daily_drift() -> f64 {
    0.05
}

fn default_max_drawdown() -> f64 {
    0.20
}

fn default_daily_max_loss() -> f64 {
    0.03
}

fn default_weekly_max_loss() -> f64 {
    0.10
}

fn default_consecutive_loss_limit() -> u32 {
    3
}

fn default_max_single_position() -> f64 {
    0.05
}

fn default_max_total_position() -> f64 {
    0.30
}

fn default_max_leverage() -> f64 {
    5.0
}

fn default_max_slippage() -> f64 {
    0.005
}

fn default_min_fill_rate() -> f64 {
    0.95
}

fn default_max_latency_ms() -> u64 {
    1000
}

fn default_extreme_volatility() -> f64 {
    0.10
}

fn default_max_data_delay_ms() -> u64 {
    5000
}

fn default_heartbeat_timeout_secs() -> u64 {
    60
}

fn default_normal_cooldown_secs() -> u64 {
    600
}

fn default_stop_loss_cooldown_secs() -> u64 {
    1200
}

fn default_consecutive_loss_cooldown_secs() -> u64 {
    3600
}

fn default_fanout_deadline_secs() -> u64 {
    30
}

fn default_order_call_timeout_secs() -> u64 {
    10
}

fn default_panel_budget_ms() -> u64 {
    250
}

/// Loads configuration by merging files and environment variables.
///
/// Sources (lowest to highest precedence):
/// 1. `config/default.toml`
/// 2. `config/{environment}.toml` (if `environment` is Some)
/// 3. `config/local.toml` (optional, ignored in git)
/// 4. Environment variables prefixed with `VERDICT__`
pub fn load_config(env: Option<&str>) -> Result<AppConfig> {
    let base_path = Path::new("config");

    let mut builder =
        Config::builder().add_source(File::from(base_path.join("default.toml")).required(false));
    if let Some(env_name) = env {
        builder = builder
            .add_source(File::from(base_path.join(format!("{env_name}.toml"))).required(false));
    }

    builder = builder.add_source(File::from(base_path.join("local.toml")).required(false));

    builder = builder.add_source(
        Environment::with_prefix("VERDICT")
            .separator("__")
            .ignore_empty(true),
    );

    let config = builder.build()?;
    let app: AppConfig = config
        .try_deserialize()
        .map_err(|err: ConfigError| anyhow::Error::from(err))?;
    app.risk.validate()?;
    Ok(app)
}

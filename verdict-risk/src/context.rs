//! Read-only snapshot handed to every risk checker in one invocation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use verdict_core::{Direction, StrategyId, WitnessHealth};

/// One historical trade relevant to behavioral checks.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub strategy_id: StrategyId,
    pub direction: Direction,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl: f64,
    pub timestamp: DateTime<Utc>,
}

/// Operator-owned thresholds consumed by the default checker set.
///
/// These are hard floors: nothing widens them at runtime, and the learning
/// layer is never handed a setter for them.
#[derive(Clone, Copy, Debug)]
pub struct RiskThresholds {
    pub max_drawdown: f64,
    pub daily_max_loss: f64,
    pub weekly_max_loss: f64,
    pub consecutive_loss_limit: u32,
    pub max_single_position: f64,
    pub max_total_position: f64,
    pub max_leverage: f64,
    pub max_slippage: f64,
    pub min_fill_rate: f64,
    pub max_latency_ms: u64,
    pub extreme_volatility: f64,
    pub max_data_delay_ms: u64,
    pub heartbeat_timeout_secs: u64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            max_drawdown: 0.20,
            daily_max_loss: 0.03,
            weekly_max_loss: 0.10,
            consecutive_loss_limit: 3,
            max_single_position: 0.05,
            max_total_position: 0.30,
            max_leverage: 5.0,
            max_slippage: 0.005,
            min_fill_rate: 0.95,
            max_latency_ms: 1000,
            extreme_volatility: 0.10,
            max_data_delay_ms: 5000,
            heartbeat_timeout_secs: 60,
        }
    }
}

/// Everything the checkers may look at. Built once per loop; checkers never
/// see live mutable state.
#[derive(Clone, Debug)]
pub struct RiskContext {
    pub equity: f64,
    pub initial_equity: f64,
    pub drawdown: f64,
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    pub consecutive_losses: u32,
    /// Current exposure as a fraction of equity.
    pub current_position_pct: f64,
    /// Position fraction the pending decision implies.
    pub requested_position_pct: f64,
    pub requested_direction: Option<Direction>,
    pub requested_leverage: f64,
    pub recent_trades: Vec<TradeRecord>,
    pub witness_health: HashMap<StrategyId, WitnessHealth>,
    pub recent_slippages: Vec<f64>,
    pub recent_fill_rates: Vec<f64>,
    pub recent_latencies_ms: Vec<u64>,
    /// Close-to-close move of the latest bar, signed.
    pub last_bar_change_pct: f64,
    /// Regime-advised position cap, when a regime is active.
    pub regime_max_position_pct: Option<f64>,
    pub data_delay_ms: u64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

impl Default for RiskContext {
    fn default() -> Self {
        Self {
            equity: 10_000.0,
            initial_equity: 10_000.0,
            drawdown: 0.0,
            daily_pnl: 0.0,
            weekly_pnl: 0.0,
            consecutive_losses: 0,
            current_position_pct: 0.0,
            requested_position_pct: 0.0,
            requested_direction: None,
            requested_leverage: 1.0,
            recent_trades: Vec::new(),
            witness_health: HashMap::new(),
            recent_slippages: Vec::new(),
            recent_fill_rates: Vec::new(),
            recent_latencies_ms: Vec::new(),
            last_bar_change_pct: 0.0,
            regime_max_position_pct: None,
            data_delay_ms: 0,
            last_heartbeat: None,
            now: Utc::now(),
        }
    }
}

impl RiskContext {
    /// Loss today as a positive fraction of equity.
    #[must_use]
    pub fn daily_loss_ratio(&self) -> f64 {
        if self.equity <= 0.0 || self.daily_pnl >= 0.0 {
            0.0
        } else {
            -self.daily_pnl / self.equity
        }
    }

    /// Loss this week as a positive fraction of equity.
    #[must_use]
    pub fn weekly_loss_ratio(&self) -> f64 {
        if self.equity <= 0.0 || self.weekly_pnl >= 0.0 {
            0.0
        } else {
            -self.weekly_pnl / self.equity
        }
    }
}

//! The decision loop: bars → witnesses → claims → aggregation → risk →
//! state machine → user fan-out, one pass per invocation.
//!
//! Loops are serialized; everything inside one loop happens in the order
//! above. Data errors skip the loop; state-machine rejections abort it and
//! leave the system consistent for the next pass.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use verdict_core::{
    Bar, Interval, ResolutionReason, RiskLevel, SystemState, TradeOutcome, TradingDecision,
};
use verdict_data::{DataError, MarketDataSource};
use verdict_executor::MultiUserExecutor;
use verdict_journal::Journal;
use verdict_risk::{RecoveryManager, RiskContext, RiskEngine};
use verdict_state::{regime::derive_regime, RegimeManager, StateMachine};
use verdict_strategy::{
    Aggregator, HealthManager, LifecycleManager, ShadowRunner, WeightManager, WitnessPanel,
};

use crate::account::AccountTracker;

/// Per-loop settings derived from configuration.
#[derive(Clone, Copy, Debug)]
pub struct LoopSettings {
    pub interval: Interval,
    /// Bars fetched per loop.
    pub lookback_bars: i64,
    pub panel_budget: StdDuration,
    /// Cooldown dwell after a settled execution.
    pub cooldown: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval: Interval::OneMinute,
            lookback_bars: 120,
            panel_budget: StdDuration::from_millis(250),
            cooldown: Duration::seconds(600),
        }
    }
}

/// What one loop pass concluded.
#[derive(Clone, Debug)]
pub enum LoopOutcome {
    /// Data was missing or failed validation; the loop was skipped.
    Skipped(String),
    /// Claims did not produce a tradeable verdict.
    NotTradeable(String),
    /// A veto witness blocked the loop.
    Vetoed { strategy_id: Option<String> },
    /// Risk denied at the given level.
    RiskDenied { level: RiskLevel, reason: String },
    /// Risk forced a system-wide lock.
    Locked { reason: String },
    /// The decision was broadcast.
    Executed {
        decision_id: Uuid,
        succeeded: usize,
        failed: usize,
    },
    /// Housekeeping only (cooldown dwell, recovery in progress).
    Idle(String),
}

/// Owns one symbol's decision pipeline end to end.
pub struct DecisionLoop {
    symbol: String,
    settings: LoopSettings,
    data: Arc<dyn MarketDataSource>,
    panel: Arc<WitnessPanel>,
    shadow: Arc<ShadowRunner>,
    aggregator: Aggregator,
    weights: Arc<WeightManager>,
    health: Arc<HealthManager>,
    lifecycle: Arc<LifecycleManager>,
    risk: Arc<RiskEngine>,
    recovery: RecoveryManager,
    machine: Arc<StateMachine>,
    regime: Arc<RegimeManager>,
    executor: Arc<MultiUserExecutor>,
    account: Mutex<AccountTracker>,
    #[allow(dead_code)]
    journal: Arc<dyn Journal>,
}

#[allow(clippy::too_many_arguments)]
impl DecisionLoop {
    pub fn new(
        symbol: impl Into<String>,
        settings: LoopSettings,
        aggregator: Aggregator,
        data: Arc<dyn MarketDataSource>,
        panel: Arc<WitnessPanel>,
        shadow: Arc<ShadowRunner>,
        weights: Arc<WeightManager>,
        health: Arc<HealthManager>,
        lifecycle: Arc<LifecycleManager>,
        risk: Arc<RiskEngine>,
        machine: Arc<StateMachine>,
        regime: Arc<RegimeManager>,
        executor: Arc<MultiUserExecutor>,
        journal: Arc<dyn Journal>,
        initial_equity: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            settings,
            data,
            panel,
            shadow,
            aggregator,
            weights,
            health,
            lifecycle,
            risk,
            recovery: RecoveryManager::default(),
            machine,
            regime,
            executor,
            account: Mutex::new(AccountTracker::new(initial_equity, Utc::now())),
            journal,
        }
    }

    /// The state machine this loop feeds.
    #[must_use]
    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Run one full decision loop at `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<LoopOutcome> {
        let correlation_id = Uuid::new_v4();

        if let Some(outcome) = self.housekeeping(now, correlation_id)? {
            return Ok(outcome);
        }

        // 1. Bars. Data problems skip the loop, never kill it.
        let since = now - self.settings.interval.as_duration() * self.settings.lookback_bars as i32;
        let bars = match self
            .data
            .bars(&self.symbol, self.settings.interval, since, now + Duration::seconds(1))
            .await
        {
            Ok(bars) => bars,
            Err(err @ (DataError::NotFound { .. } | DataError::Validation(_))) => {
                warn!(error = %err, "loop skipped on data error");
                return Ok(LoopOutcome::Skipped(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let Some(last_bar) = bars.last().cloned() else {
            return Ok(LoopOutcome::Skipped("empty bar series".into()));
        };

        // 2. Witnesses, with shadow routing.
        let collection = self.panel.collect(&bars, self.settings.panel_budget);
        self.shadow
            .observe(&collection.shadow_claims, last_bar.close, now);

        // 3. Aggregation against a stable weight snapshot.
        let weight_snapshot = self.weights.snapshot();
        let verdict = self
            .aggregator
            .aggregate(&collection.claims, now, &weight_snapshot);

        if verdict.resolution == ResolutionReason::Vetoed {
            self.lifecycle_tail(now);
            return Ok(LoopOutcome::Vetoed {
                strategy_id: verdict.veto_strategy_id,
            });
        }
        if !verdict.is_tradeable {
            self.lifecycle_tail(now);
            return Ok(LoopOutcome::NotTradeable(verdict.reason));
        }

        // 4. Risk gate over a read-only snapshot.
        let regime_constraints = self.regime.constraints(now);
        let position_pct = regime_constraints.max_position_pct;
        let context = self.risk_context(&last_bar, position_pct, now);
        let decision_risk = self.risk.check(&context, correlation_id);
        if !decision_risk.approved {
            let reason = decision_risk
                .reason
                .unwrap_or_else(|| "risk denied".to_string());
            if decision_risk.level == RiskLevel::RiskLocked {
                self.machine.force_lock(&reason, correlation_id)?;
                return Ok(LoopOutcome::Locked { reason });
            }
            self.lifecycle_tail(now);
            return Ok(LoopOutcome::RiskDenied {
                level: decision_risk.level,
                reason,
            });
        }

        // 5. State machine: the only authorization path.
        self.machine.become_eligible(&verdict.reason, correlation_id)?;
        self.machine
            .authorize_execution("execution authorized", correlation_id)?;

        // 6. Regime advisory from the dominant claim.
        let dominant = collection
            .claims
            .iter()
            .find(|claim| Some(&claim.strategy_id) == verdict.dominant_strategy_id.as_ref());
        if let Some(dominant) = dominant {
            self.regime
                .set_regime(derive_regime(dominant), verdict.total_confidence, now);
        }

        let direction = verdict
            .dominant_direction
            .expect("tradeable verdict carries a direction");
        let decision = TradingDecision {
            id: correlation_id,
            symbol: self.symbol.clone(),
            direction,
            confidence: verdict.total_confidence,
            position_pct,
            reference_price: last_bar.close,
            stop_loss_pct: Some(regime_constraints.stop_loss_pct),
            take_profit_pct: Some(regime_constraints.take_profit_pct),
            regime: self.regime.current(now),
            created_at: now,
        };

        // 7. Fan out to every eligible user.
        let broadcast = self.executor.broadcast(&decision).await;

        // 8. Settle into cooldown.
        self.machine
            .settle_execution("execution settled", correlation_id)?;
        self.lifecycle_tail(now);

        info!(
            decision = %decision.id,
            direction = %direction,
            confidence = verdict.total_confidence,
            succeeded = broadcast.succeeded,
            failed = broadcast.failed,
            "decision executed"
        );
        Ok(LoopOutcome::Executed {
            decision_id: decision.id,
            succeeded: broadcast.succeeded,
            failed: broadcast.failed,
        })
    }

    /// Fold a settled trade outcome back into health, user risk, and the
    /// aggregate account. Weight changes follow on the next read (pull).
    pub async fn record_trade_outcome(&self, outcome: &TradeOutcome) {
        self.health.record(outcome);
        {
            let mut account = self.account.lock().expect("account poisoned");
            account.apply_pnl(outcome.pnl, outcome.timestamp);
        }
        if let Some(user_id) = &outcome.user_id {
            let equity = self.account.lock().expect("account poisoned").equity;
            let ratio = if equity != 0.0 { outcome.pnl / equity } else { 0.0 };
            self.executor
                .apply_trade_result(user_id, ratio, Uuid::new_v4())
                .await;
        }
    }

    /// Apply a batch of learner-proposed factors. Clamping, drift limits,
    /// and audit records all live in the weight manager.
    pub fn apply_learning_factors(&self, factors: &[(String, f64)]) {
        for (strategy_id, factor) in factors {
            self.weights
                .set_learning_factor(strategy_id, *factor, "learning_engine");
        }
    }

    fn housekeeping(
        &self,
        now: DateTime<Utc>,
        correlation_id: Uuid,
    ) -> Result<Option<LoopOutcome>> {
        match self.machine.current_state() {
            SystemState::SystemInit => {
                self.machine.complete_init(correlation_id)?;
                Ok(None)
            }
            SystemState::Cooldown => {
                if self.machine.state_duration(now) >= self.settings.cooldown {
                    self.machine.complete_cooldown(correlation_id)?;
                    Ok(None)
                } else {
                    Ok(Some(LoopOutcome::Idle("cooldown dwell".into())))
                }
            }
            SystemState::Eligible => {
                // A stale eligibility window from an aborted loop.
                self.machine
                    .cancel_eligible("eligibility window lapsed", correlation_id)?;
                Ok(None)
            }
            SystemState::RiskLocked => {
                if self.recovery.is_auto_unlock_due(&self.risk, now) {
                    self.recovery.approve_unlock(&self.risk)?;
                    self.machine.approve_recovery("auto unlock", correlation_id)?;
                    self.recovery.complete(&self.risk)?;
                    self.machine.complete_recovery(correlation_id)?;
                    Ok(None)
                } else {
                    Ok(Some(LoopOutcome::Idle("risk locked".into())))
                }
            }
            SystemState::Recovery => Ok(Some(LoopOutcome::Idle("recovery in progress".into()))),
            SystemState::Observing | SystemState::ActiveTrading => Ok(None),
        }
    }

    fn risk_context(&self, last_bar: &Bar, position_pct: f64, now: DateTime<Utc>) -> RiskContext {
        let account = self.account.lock().expect("account poisoned");
        let data_delay_ms = (now - last_bar.timestamp).num_milliseconds().max(0) as u64;
        RiskContext {
            equity: account.equity,
            initial_equity: account.initial_equity,
            drawdown: account.drawdown(),
            daily_pnl: account.daily_pnl,
            weekly_pnl: account.weekly_pnl,
            consecutive_losses: account.consecutive_losses,
            current_position_pct: account.current_position_pct,
            requested_position_pct: position_pct,
            requested_direction: None,
            requested_leverage: 1.0,
            recent_trades: Vec::new(),
            witness_health: self.health.all(),
            recent_slippages: Vec::new(),
            recent_fill_rates: Vec::new(),
            recent_latencies_ms: Vec::new(),
            last_bar_change_pct: last_bar.body_pct(),
            regime_max_position_pct: Some(self.regime.constraints(now).max_position_pct),
            data_delay_ms,
            last_heartbeat: Some(now),
            now,
        }
    }

    fn lifecycle_tail(&self, now: DateTime<Utc>) {
        if let Err(err) = self.lifecycle.sweep(&self.panel, &self.health, now) {
            warn!(error = %err, "lifecycle sweep failed");
        }
    }
}

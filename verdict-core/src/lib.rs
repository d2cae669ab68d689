//! Fundamental data types shared across the entire workspace.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alias used for human-readable market symbols (e.g., `BTCUSDT`).
pub type Symbol = String;
/// Identifier assigned to a registered strategy ("witness").
pub type StrategyId = String;
/// Identifier of a platform user.
pub type UserId = String;
/// Identifier assigned to orders (caller or exchange provided).
pub type OrderId = String;

/// Interval granularity of aggregated bars.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    FourHours,
    OneDay,
}

impl Interval {
    /// Convert the interval into a chrono `Duration`.
    #[must_use]
    pub fn as_duration(self) -> Duration {
        match self {
            Self::OneMinute => Duration::minutes(1),
            Self::FiveMinutes => Duration::minutes(5),
            Self::FifteenMinutes => Duration::minutes(15),
            Self::OneHour => Duration::hours(1),
            Self::FourHours => Duration::hours(4),
            Self::OneDay => Duration::days(1),
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "1m" | "1min" | "1minute" => Ok(Self::OneMinute),
            "5m" | "5min" | "5minutes" => Ok(Self::FiveMinutes),
            "15m" | "15min" | "15minutes" => Ok(Self::FifteenMinutes),
            "1h" | "60m" | "1hour" => Ok(Self::OneHour),
            "4h" | "240m" | "4hours" => Ok(Self::FourHours),
            "1d" | "day" | "d" => Ok(Self::OneDay),
            other => Err(format!("unsupported interval '{other}'")),
        }
    }
}

/// Aggregated OHLCV bar.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub interval: Interval,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    /// Close-to-open change of this bar as a signed fraction.
    #[must_use]
    pub fn body_pct(&self) -> f64 {
        if self.open == 0.0 {
            return 0.0;
        }
        (self.close - self.open) / self.open
    }

    /// Total high-low range as a fraction of the open.
    #[must_use]
    pub fn range_pct(&self) -> f64 {
        if self.open == 0.0 {
            return 0.0;
        }
        (self.high - self.low) / self.open
    }
}

/// Trade direction asserted by a claim or decision.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// The order side that opens a position in this direction.
    #[must_use]
    pub fn entry_side(self) -> Side {
        match self {
            Self::Long => Side::Buy,
            Self::Short => Side::Sell,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Whitelisted claim types a witness may emit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    MarketEligible,
    MarketNotEligible,
    RegimeMatched,
    RegimeConflict,
    ExecutionVeto,
}

/// Witness role inside the panel.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WitnessTier {
    /// Core witnesses drive the dominant direction.
    Core,
    /// Auxiliary witnesses support or oppose the dominant claim.
    Auxiliary,
    /// Veto witnesses can only block execution.
    Veto,
}

impl WitnessTier {
    /// Claim types a witness of this tier is allowed to emit.
    #[must_use]
    pub fn allows(self, claim_type: ClaimType) -> bool {
        match self {
            Self::Core => matches!(
                claim_type,
                ClaimType::MarketEligible | ClaimType::MarketNotEligible | ClaimType::RegimeMatched
            ),
            Self::Auxiliary => matches!(
                claim_type,
                ClaimType::RegimeMatched | ClaimType::RegimeConflict | ClaimType::MarketNotEligible
            ),
            Self::Veto => matches!(claim_type, ClaimType::ExecutionVeto),
        }
    }
}

impl fmt::Display for WitnessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Auxiliary => write!(f, "auxiliary"),
            Self::Veto => write!(f, "veto"),
        }
    }
}

/// Immutable, time-bounded assertion about market state from one witness.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Claim {
    pub strategy_id: StrategyId,
    /// Tier the emitting witness held when the claim was collected.
    pub tier: WitnessTier,
    pub claim_type: ClaimType,
    pub confidence: f64,
    pub validity_window_secs: i64,
    pub direction: Option<Direction>,
    #[serde(default)]
    pub constraints: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Claim {
    /// Instant after which the claim must be ignored.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + Duration::seconds(self.validity_window_secs)
    }

    /// Whether the claim has outlived its validity window.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() < now
    }

    /// Fetch a string constraint by key.
    #[must_use]
    pub fn constraint_str(&self, key: &str) -> Option<&str> {
        self.constraints.get(key).and_then(|value| value.as_str())
    }
}

/// Strategy lifecycle status; `Retired` is terminal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    New,
    Testing,
    Shadow,
    Active,
    Degraded,
    Retired,
}

impl LifecycleStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Retired)
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Testing => "testing",
            Self::Shadow => "shadow",
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Retired => "retired",
        };
        write!(f, "{name}")
    }
}

/// Witness health grade derived from its trade record.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum HealthGrade {
    A,
    B,
    C,
    D,
}

impl HealthGrade {
    /// Weight multiplier applied for this grade.
    #[must_use]
    pub fn health_factor(self) -> f64 {
        match self {
            Self::A => 1.2,
            Self::B => 1.0,
            Self::C => 0.7,
            Self::D => 0.5,
        }
    }
}

/// Health snapshot of one witness.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WitnessHealth {
    pub strategy_id: StrategyId,
    pub grade: HealthGrade,
    pub win_rate: f64,
    pub sample_count: u64,
    pub weight_scalar: f64,
}

/// Per-witness weight decomposition; `effective` is the product of the parts.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WitnessWeight {
    pub strategy_id: StrategyId,
    pub base_weight: f64,
    pub health_factor: f64,
    pub learning_factor: f64,
    pub updated_at: DateTime<Utc>,
}

impl WitnessWeight {
    #[must_use]
    pub fn effective(&self) -> f64 {
        self.base_weight * self.health_factor * self.learning_factor
    }
}

/// Outcome of one trade attributed to a strategy, used for health updates.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TradeOutcome {
    pub strategy_id: StrategyId,
    pub user_id: Option<UserId>,
    pub pnl: f64,
    pub is_win: bool,
    pub timestamp: DateTime<Utc>,
}

/// How a claim set was resolved by the aggregator.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    NoClaims,
    Vetoed,
    RegimeUnclear,
    NoEligibleClaims,
    DominantSelected,
}

/// Result of aggregating one loop's claim set.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AggregatedVerdict {
    pub dominant_direction: Option<Direction>,
    pub dominant_strategy_id: Option<StrategyId>,
    pub total_confidence: f64,
    pub is_tradeable: bool,
    pub veto_strategy_id: Option<StrategyId>,
    pub resolution: ResolutionReason,
    pub reason: String,
}

impl AggregatedVerdict {
    /// A refusal verdict carrying only the resolution and reason.
    #[must_use]
    pub fn refusal(resolution: ResolutionReason, reason: impl Into<String>) -> Self {
        Self {
            dominant_direction: None,
            dominant_strategy_id: None,
            total_confidence: 0.0,
            is_tradeable: false,
            veto_strategy_id: None,
            resolution,
            reason: reason.into(),
        }
    }
}

/// Process-wide trading state; single-writer through the state machine.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    SystemInit,
    Observing,
    Eligible,
    ActiveTrading,
    Cooldown,
    RiskLocked,
    Recovery,
}

impl SystemState {
    /// Whether order submission is permitted in this state.
    #[must_use]
    pub fn allows_trading(self) -> bool {
        matches!(self, Self::ActiveTrading)
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SystemInit => "system_init",
            Self::Observing => "observing",
            Self::Eligible => "eligible",
            Self::ActiveTrading => "active_trading",
            Self::Cooldown => "cooldown",
            Self::RiskLocked => "risk_locked",
            Self::Recovery => "recovery",
        };
        write!(f, "{name}")
    }
}

/// Qualitative market mode derived from the dominant core claim.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeRegime {
    VolatilityExpansion,
    RangeStructureBreak,
    LiquiditySweep,
    NoRegime,
}

impl FromStr for TradeRegime {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "volatility_expansion" => Ok(Self::VolatilityExpansion),
            "range_structure_break" => Ok(Self::RangeStructureBreak),
            "liquidity_sweep" => Ok(Self::LiquiditySweep),
            "no_regime" => Ok(Self::NoRegime),
            other => Err(format!("unknown trade regime '{other}'")),
        }
    }
}

/// Unified risk severity returned by the risk engine.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    Warning,
    Cooldown,
    RiskLocked,
}

impl RiskLevel {
    /// Total severity order used for max aggregation.
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Warning => 1,
            Self::Cooldown => 2,
            Self::RiskLocked => 3,
        }
    }

    /// The more severe of two levels.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Classification of journaled risk events.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventType {
    DrawdownExceeded,
    DailyLossExceeded,
    WeeklyLossExceeded,
    ConsecutiveLoss,
    VolatilitySpike,
    LiquidityLow,
    ExecutionFailure,
    PositionLimit,
    LeverageLimit,
    DataStale,
}

/// Order side.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Order execution style.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

/// High-level order status.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingNew,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    #[must_use]
    pub fn is_fill(self) -> bool {
        matches!(self, Self::Filled | Self::PartiallyFilled)
    }
}

/// Desired order placement parameters passed to an exchange client.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub client_order_id: Option<OrderId>,
}

/// Exchange-side result of placing one order.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ExchangeOrderResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub executed_quantity: f64,
    pub executed_price: f64,
    pub commission: f64,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of an exchange position.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Option<Side>,
    pub quantity: f64,
    pub entry_price: Option<f64>,
    pub unrealized_pnl: f64,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// A flat placeholder position for a symbol.
    #[must_use]
    pub fn flat(symbol: impl Into<Symbol>, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            side: None,
            quantity: 0.0,
            entry_price: None,
            unrealized_pnl: 0.0,
            updated_at: now,
        }
    }
}

/// Symbolic codes attached to an execution report.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionFlag {
    RiskLockedTriggered,
    CooldownTriggered,
    Timeout,
    Canceled,
    DuplicateReplay,
}

/// Immutable record of one user's execution of one decision.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub executed_quantity: f64,
    pub executed_price: f64,
    pub slippage: f64,
    pub commission: f64,
    pub flags: BTreeSet<ExecutionFlag>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionReport {
    /// A failed report carrying only an error and optional flags.
    #[must_use]
    pub fn failure(
        user_id: impl Into<UserId>,
        order_id: impl Into<OrderId>,
        error: impl Into<String>,
        flags: impl IntoIterator<Item = ExecutionFlag>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            order_id: order_id.into(),
            status: OrderStatus::Rejected,
            executed_quantity: 0.0,
            executed_price: 0.0,
            slippage: 0.0,
            commission: 0.0,
            flags: flags.into_iter().collect(),
            error: Some(error.into()),
            timestamp: now,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_fill()
    }
}

/// The abstract, user-independent decision broadcast to every eligible user.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TradingDecision {
    pub id: Uuid,
    pub symbol: Symbol,
    pub direction: Direction,
    pub confidence: f64,
    /// Position fraction of equity the decision implies before per-user caps.
    pub position_pct: f64,
    pub reference_price: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    /// Advisory only; users may not rely on it for sizing.
    pub regime: TradeRegime,
    pub created_at: DateTime<Utc>,
}

//! Shadow runner: records hypothetical trades for non-activated strategies.
//!
//! Shadow output never reaches the aggregator; it only feeds the promotion
//! check. Validity windows are enforced on shadow claims the same way the
//! aggregator enforces them on live ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use verdict_core::{Claim, Direction, StrategyId};

/// Days a strategy must shadow-run before promotion.
pub const MIN_SHADOW_DAYS: i64 = 7;
/// Minimum shadow win rate for promotion.
pub const MIN_WIN_RATE: f64 = 0.51;
/// Minimum settled shadow trades for promotion.
pub const MIN_TRADES: usize = 10;

/// One hypothetical trade: the claim plus the contemporaneous price.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ShadowTradeRecord {
    pub strategy_id: StrategyId,
    pub claim: Claim,
    pub market_price: f64,
    pub simulated_entry: f64,
    pub simulated_exit: Option<f64>,
    pub simulated_pnl: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Rolling shadow performance used by the promotion check.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ShadowPerformance {
    pub strategy_id: StrategyId,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub days_running: i64,
}

impl ShadowPerformance {
    /// Promotion gate: enough runtime, enough trades, positive edge.
    #[must_use]
    pub fn is_ready_for_promotion(&self) -> bool {
        self.days_running >= MIN_SHADOW_DAYS
            && self.win_rate >= MIN_WIN_RATE
            && self.total_trades >= MIN_TRADES
    }
}

struct ShadowBook {
    started_at: DateTime<Utc>,
    records: Vec<ShadowTradeRecord>,
}

/// Per-strategy log of hypothetical trades.
#[derive(Default)]
pub struct ShadowRunner {
    books: Mutex<HashMap<StrategyId, ShadowBook>>,
    expired_dropped: AtomicU64,
}

impl ShadowRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin shadow-tracking a strategy.
    pub fn register(&self, strategy_id: &str, now: DateTime<Utc>) {
        let mut books = self.books.lock().expect("shadow runner poisoned");
        books.entry(strategy_id.to_string()).or_insert(ShadowBook {
            started_at: now,
            records: Vec::new(),
        });
        info!(strategy = %strategy_id, "shadow tracking started");
    }

    /// Stop tracking and drop the book.
    pub fn unregister(&self, strategy_id: &str) {
        let mut books = self.books.lock().expect("shadow runner poisoned");
        books.remove(strategy_id);
        info!(strategy = %strategy_id, "shadow tracking stopped");
    }

    /// Record this loop's shadow claims against the current price.
    ///
    /// Directionless and expired claims are not simulated.
    pub fn observe(&self, claims: &[Claim], market_price: f64, now: DateTime<Utc>) {
        let mut books = self.books.lock().expect("shadow runner poisoned");
        for claim in claims {
            if claim.direction.is_none() {
                continue;
            }
            if claim.is_expired(now) {
                self.expired_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(strategy = %claim.strategy_id, "expired shadow claim dropped");
                continue;
            }
            let book = books
                .entry(claim.strategy_id.clone())
                .or_insert(ShadowBook {
                    started_at: now,
                    records: Vec::new(),
                });
            book.records.push(ShadowTradeRecord {
                strategy_id: claim.strategy_id.clone(),
                claim: claim.clone(),
                market_price,
                simulated_entry: market_price,
                simulated_exit: None,
                simulated_pnl: None,
                timestamp: now,
            });
        }
    }

    /// Settle the most recent open shadow trade of a strategy at the given
    /// exit price.
    pub fn settle(&self, strategy_id: &str, exit_price: f64) {
        let mut books = self.books.lock().expect("shadow runner poisoned");
        let Some(book) = books.get_mut(strategy_id) else {
            return;
        };
        for record in book.records.iter_mut().rev() {
            if record.simulated_exit.is_some() {
                continue;
            }
            record.simulated_exit = Some(exit_price);
            let entry = record.simulated_entry;
            if entry != 0.0 {
                let pnl = match record.claim.direction {
                    Some(Direction::Long) => (exit_price - entry) / entry,
                    Some(Direction::Short) => (entry - exit_price) / entry,
                    None => 0.0,
                };
                record.simulated_pnl = Some(pnl);
            } else {
                record.simulated_pnl = Some(0.0);
            }
            break;
        }
    }

    /// Rolling performance over settled trades.
    #[must_use]
    pub fn performance(&self, strategy_id: &str, now: DateTime<Utc>) -> Option<ShadowPerformance> {
        let books = self.books.lock().expect("shadow runner poisoned");
        let book = books.get(strategy_id)?;
        let settled: Vec<&ShadowTradeRecord> = book
            .records
            .iter()
            .filter(|record| record.simulated_pnl.is_some())
            .collect();
        let winning = settled
            .iter()
            .filter(|record| record.simulated_pnl.unwrap_or(0.0) > 0.0)
            .count();
        let total_pnl: f64 = settled
            .iter()
            .filter_map(|record| record.simulated_pnl)
            .sum();
        let total = settled.len();
        Some(ShadowPerformance {
            strategy_id: strategy_id.to_string(),
            total_trades: total,
            winning_trades: winning,
            losing_trades: total - winning,
            total_pnl,
            win_rate: if total == 0 {
                0.0
            } else {
                winning as f64 / total as f64
            },
            days_running: (now - book.started_at).num_days(),
        })
    }

    /// Whether the strategy meets the promotion gate.
    #[must_use]
    pub fn is_ready_for_promotion(&self, strategy_id: &str, now: DateTime<Utc>) -> bool {
        self.performance(strategy_id, now)
            .map(|perf| perf.is_ready_for_promotion())
            .unwrap_or(false)
    }

    /// Shadow trade log for a strategy.
    #[must_use]
    pub fn records(&self, strategy_id: &str) -> Vec<ShadowTradeRecord> {
        let books = self.books.lock().expect("shadow runner poisoned");
        books
            .get(strategy_id)
            .map(|book| book.records.clone())
            .unwrap_or_default()
    }

    /// Number of tracked strategies.
    #[must_use]
    pub fn strategy_count(&self) -> usize {
        self.books.lock().expect("shadow runner poisoned").len()
    }

    /// Expired shadow claims dropped so far.
    #[must_use]
    pub fn expired_claim_count(&self) -> u64 {
        self.expired_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use verdict_core::{ClaimType, WitnessTier};

    fn claim(id: &str, direction: Direction, ts: DateTime<Utc>) -> Claim {
        Claim {
            strategy_id: id.into(),
            tier: WitnessTier::Auxiliary,
            claim_type: ClaimType::RegimeMatched,
            confidence: 0.6,
            validity_window_secs: 60,
            direction: Some(direction),
            constraints: serde_json::Map::new(),
            timestamp: ts,
        }
    }

    #[test]
    fn shadow_trades_settle_with_signed_pnl() {
        let runner = ShadowRunner::new();
        let now = Utc::now();
        runner.register("w1", now);
        runner.observe(&[claim("w1", Direction::Long, now)], 100.0, now);
        runner.settle("w1", 103.0);
        runner.observe(&[claim("w1", Direction::Short, now)], 103.0, now);
        runner.settle("w1", 100.0);

        let perf = runner.performance("w1", now).unwrap();
        assert_eq!(perf.total_trades, 2);
        assert_eq!(perf.winning_trades, 2);
        assert!(perf.total_pnl > 0.0);
    }

    #[test]
    fn expired_shadow_claims_are_not_simulated() {
        let runner = ShadowRunner::new();
        let now = Utc::now();
        runner.register("w1", now);
        let stale = claim("w1", Direction::Long, now - Duration::seconds(120));
        runner.observe(&[stale], 100.0, now);
        assert!(runner.records("w1").is_empty());
        assert_eq!(runner.expired_claim_count(), 1);
    }

    #[test]
    fn promotion_gate_needs_days_trades_and_win_rate() {
        let runner = ShadowRunner::new();
        let start = Utc::now();
        runner.register("w1", start);
        for _ in 0..12 {
            let now = Utc::now();
            runner.observe(&[claim("w1", Direction::Long, now)], 100.0, now);
            runner.settle("w1", 101.0);
        }
        // Enough trades and wins, but not enough runtime.
        assert!(!runner.is_ready_for_promotion("w1", start + Duration::days(3)));
        assert!(runner.is_ready_for_promotion("w1", start + Duration::days(8)));
    }
}

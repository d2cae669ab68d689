//! Aggregate account tracking feeding the risk context.

use chrono::{DateTime, Datelike, Utc};

/// Rolling aggregate of the shared book: equity, peaks, and pnl windows.
#[derive(Clone, Debug)]
pub struct AccountTracker {
    pub equity: f64,
    pub initial_equity: f64,
    pub peak_equity: f64,
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    pub consecutive_losses: u32,
    pub current_position_pct: f64,
    day_anchor: DateTime<Utc>,
    week_anchor: DateTime<Utc>,
}

impl AccountTracker {
    #[must_use]
    pub fn new(initial_equity: f64, now: DateTime<Utc>) -> Self {
        Self {
            equity: initial_equity,
            initial_equity,
            peak_equity: initial_equity,
            daily_pnl: 0.0,
            weekly_pnl: 0.0,
            consecutive_losses: 0,
            current_position_pct: 0.0,
            day_anchor: now,
            week_anchor: now,
        }
    }

    /// Roll the daily/weekly windows forward when their anchor expires.
    pub fn roll_windows(&mut self, now: DateTime<Utc>) {
        if now.date_naive() != self.day_anchor.date_naive() {
            self.daily_pnl = 0.0;
            self.day_anchor = now;
        }
        if now.iso_week() != self.week_anchor.iso_week() {
            self.weekly_pnl = 0.0;
            self.week_anchor = now;
        }
    }

    /// Fold one realized pnl amount into the aggregates.
    pub fn apply_pnl(&mut self, pnl: f64, now: DateTime<Utc>) {
        self.roll_windows(now);
        self.equity += pnl;
        self.daily_pnl += pnl;
        self.weekly_pnl += pnl;
        if self.equity > self.peak_equity {
            self.peak_equity = self.equity;
        }
        if pnl < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }

    /// Drawdown from the peak as a fraction.
    #[must_use]
    pub fn drawdown(&self) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity - self.equity) / self.peak_equity).max(0.0)
    }
}

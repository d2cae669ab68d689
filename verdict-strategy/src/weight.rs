//! Dynamic witness weights: `effective = base × health_factor × learning`.
//!
//! The health factor is refreshed from the current grade at read time; the
//! base and learning factors are clamped on every write and each write emits
//! an audit record. The learning factor additionally honors a cumulative
//! daily drift cap.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use verdict_core::{StrategyId, WitnessWeight};
use verdict_journal::{AuditEvent, Journal, WeightChangeRecord};

use crate::aggregate::WeightSource;
use crate::health::HealthManager;

/// Clamp ranges for the weight components.
#[derive(Clone, Copy, Debug)]
pub struct WeightClamps {
    pub base_min: f64,
    pub base_max: f64,
    pub health_min: f64,
    pub health_max: f64,
    pub learning_min: f64,
    pub learning_max: f64,
    /// Maximum absolute learning-factor movement within one UTC day,
    /// cumulative across setter calls.
    pub learning_daily_drift: f64,
}

impl Default for WeightClamps {
    fn default() -> Self {
        Self {
            base_min: 0.5,
            base_max: 2.0,
            health_min: 0.5,
            health_max: 1.2,
            learning_min: 0.8,
            learning_max: 1.2,
            learning_daily_drift: 0.05,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct WeightEntry {
    base: f64,
    learning: f64,
    drift_day: NaiveDate,
    drift_anchor: f64,
    updated_at: DateTime<Utc>,
}

impl WeightEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            base: 1.0,
            learning: 1.0,
            drift_day: now.date_naive(),
            drift_anchor: 1.0,
            updated_at: now,
        }
    }
}

/// Owns the weight table. Reads are non-blocking snapshots; mutations are
/// serialized behind the table lock.
pub struct WeightManager {
    clamps: WeightClamps,
    health: Arc<HealthManager>,
    journal: Arc<dyn Journal>,
    entries: RwLock<HashMap<StrategyId, WeightEntry>>,
}

impl WeightManager {
    #[must_use]
    pub fn new(clamps: WeightClamps, health: Arc<HealthManager>, journal: Arc<dyn Journal>) -> Self {
        Self {
            clamps,
            health,
            journal,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Current weight for a strategy. The health factor is pulled from the
    /// health manager at read time, so a grade change is visible on the next
    /// call without any setter.
    #[must_use]
    pub fn get_weight(&self, strategy_id: &str) -> WitnessWeight {
        let entries = self.entries.read().expect("weight table poisoned");
        let entry = entries
            .get(strategy_id)
            .copied()
            .unwrap_or_else(|| WeightEntry::new(Utc::now()));
        drop(entries);
        let health_factor = self
            .health
            .grade(strategy_id)
            .health_factor()
            .clamp(self.clamps.health_min, self.clamps.health_max);
        WitnessWeight {
            strategy_id: strategy_id.to_string(),
            base_weight: entry.base,
            health_factor,
            learning_factor: entry.learning,
            updated_at: entry.updated_at,
        }
    }

    /// Stable effective-weight snapshot for one aggregation pass.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<StrategyId, f64> {
        let ids: Vec<StrategyId> = {
            let entries = self.entries.read().expect("weight table poisoned");
            entries.keys().cloned().collect()
        };
        ids.into_iter()
            .map(|id| {
                let weight = self.get_weight(&id);
                (id, weight.effective())
            })
            .collect()
    }

    /// Operator-set base weight, clamped to its range. Returns the applied
    /// value.
    pub fn set_base_weight(&self, strategy_id: &str, value: f64, actor: &str) -> f64 {
        let now = Utc::now();
        let applied = value.clamp(self.clamps.base_min, self.clamps.base_max);
        let previous = {
            let mut entries = self.entries.write().expect("weight table poisoned");
            let entry = entries
                .entry(strategy_id.to_string())
                .or_insert_with(|| WeightEntry::new(now));
            let previous = entry.base;
            entry.base = applied;
            entry.updated_at = now;
            previous
        };
        self.audit(strategy_id, "base_weight", previous, value, applied, actor, now);
        info!(strategy = %strategy_id, base = applied, "base weight set");
        applied
    }

    /// Learner-set factor, clamped to its range and to the cumulative daily
    /// drift window. Returns the applied value.
    pub fn set_learning_factor(&self, strategy_id: &str, value: f64, actor: &str) -> f64 {
        self.set_learning_factor_at(strategy_id, value, actor, Utc::now())
    }

    /// Same as [`set_learning_factor`], with an explicit clock for tests.
    ///
    /// [`set_learning_factor`]: Self::set_learning_factor
    pub fn set_learning_factor_at(
        &self,
        strategy_id: &str,
        value: f64,
        actor: &str,
        now: DateTime<Utc>,
    ) -> f64 {
        let (previous, applied) = {
            let mut entries = self.entries.write().expect("weight table poisoned");
            let entry = entries
                .entry(strategy_id.to_string())
                .or_insert_with(|| WeightEntry::new(now));
            let today = now.date_naive();
            if entry.drift_day != today {
                entry.drift_day = today;
                entry.drift_anchor = entry.learning;
            }
            let drift = self.clamps.learning_daily_drift;
            let lower = (entry.drift_anchor - drift).max(self.clamps.learning_min);
            let upper = (entry.drift_anchor + drift).min(self.clamps.learning_max);
            let previous = entry.learning;
            let applied = value.clamp(lower, upper);
            entry.learning = applied;
            entry.updated_at = now;
            (previous, applied)
        };
        self.audit(strategy_id, "learning_factor", previous, value, applied, actor, now);
        info!(strategy = %strategy_id, learning = applied, "learning factor set");
        applied
    }

    #[allow(clippy::too_many_arguments)]
    fn audit(
        &self,
        strategy_id: &str,
        field: &str,
        previous: f64,
        requested: f64,
        applied: f64,
        actor: &str,
        now: DateTime<Utc>,
    ) {
        let record = WeightChangeRecord {
            strategy_id: strategy_id.to_string(),
            field: field.to_string(),
            previous,
            requested,
            applied,
            actor: actor.to_string(),
            correlation_id: Uuid::new_v4(),
            timestamp: now,
        };
        if let Err(err) = self
            .journal
            .append("weight_manager", &AuditEvent::WeightChange(record))
        {
            tracing::error!(error = %err, strategy = %strategy_id, "weight audit write failed");
        }
    }
}

impl WeightSource for WeightManager {
    fn effective_weight(&self, strategy_id: &str) -> f64 {
        self.get_weight(strategy_id).effective()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use verdict_core::TradeOutcome;
    use verdict_journal::MemoryJournal;

    fn setup() -> (WeightManager, Arc<HealthManager>, Arc<MemoryJournal>) {
        let health = Arc::new(HealthManager::new());
        let journal = Arc::new(MemoryJournal::new());
        let manager = WeightManager::new(WeightClamps::default(), health.clone(), journal.clone());
        (manager, health, journal)
    }

    fn feed(health: &HealthManager, id: &str, wins: u64, losses: u64) {
        for i in 0..(wins + losses) {
            health.record(&TradeOutcome {
                strategy_id: id.into(),
                user_id: None,
                pnl: 1.0,
                is_win: i < wins,
                timestamp: Utc::now(),
            });
        }
    }

    #[test]
    fn base_weight_is_clamped_and_audited() {
        let (manager, _, journal) = setup();
        assert_eq!(manager.set_base_weight("w1", 5.0, "operator"), 2.0);
        assert_eq!(manager.set_base_weight("w1", 0.1, "operator"), 0.5);
        assert_eq!(journal.stream("weight_changes").len(), 2);
    }

    #[test]
    fn learning_factor_daily_drift_is_cumulative() {
        let (manager, _, _) = setup();
        let day = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        // First move: full +0.05 from the 1.0 anchor.
        assert_eq!(manager.set_learning_factor_at("w1", 1.2, "learner", day), 1.05);
        // Second move the same day cannot widen the day's total movement.
        assert_eq!(
            manager.set_learning_factor_at("w1", 1.2, "learner", day + Duration::hours(2)),
            1.05
        );
        // Next day the anchor resets to the current value.
        assert_eq!(
            manager.set_learning_factor_at("w1", 1.2, "learner", day + Duration::days(1)),
            1.1
        );
    }

    #[test]
    fn learning_factor_respects_absolute_clamps() {
        let (manager, _, _) = setup();
        let day = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut applied = 1.0;
        for offset in 0..10 {
            applied = manager.set_learning_factor_at(
                "w1",
                0.0,
                "learner",
                day + Duration::days(offset),
            );
        }
        assert_eq!(applied, 0.8);
    }

    #[test]
    fn health_factor_is_pulled_at_read_time() {
        let (manager, health, _) = setup();
        manager.set_base_weight("w1", 1.0, "operator");
        // Grade A: 60 wins out of 100.
        feed(&health, "w1", 60, 40);
        assert!((manager.get_weight("w1").effective() - 1.2).abs() < 1e-9);
        // Push the win rate into the C band without touching any setter.
        feed(&health, "w1", 0, 40); // 60/140 ≈ 0.43
        assert!((manager.get_weight("w1").effective() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn effective_weight_stays_inside_the_product_bounds() {
        let (manager, health, _) = setup();
        feed(&health, "w1", 10, 90); // grade D
        manager.set_base_weight("w1", 0.1, "operator");
        let mut floor = manager.get_weight("w1").effective();
        for _ in 0..8 {
            floor = floor.min(manager.get_weight("w1").effective());
        }
        assert!(floor >= 0.5 * 0.5 * 0.8 - 1e-9);

        manager.set_base_weight("w1", 10.0, "operator");
        let weight = manager.get_weight("w1");
        assert!(weight.effective() <= 2.0 * 1.2 * 1.2 + 1e-9);
    }
}

//! Witness health tracking: win rates, grades, and the auto-mute rule.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::info;

use verdict_core::{HealthGrade, StrategyId, TradeOutcome, WitnessHealth};

/// Samples required before a grade other than the neutral B is assigned,
/// and before grade D triggers an auto-mute.
pub const MIN_SAMPLE_SIZE: u64 = 50;

#[derive(Clone, Copy, Debug, Default)]
struct HealthEntry {
    wins: u64,
    samples: u64,
    pnl_sum: f64,
}

impl HealthEntry {
    fn win_rate(&self) -> f64 {
        if self.samples == 0 {
            0.5
        } else {
            self.wins as f64 / self.samples as f64
        }
    }
}

/// Tracks per-witness trade outcomes and derives health grades.
#[derive(Default)]
pub struct HealthManager {
    entries: Mutex<HashMap<StrategyId, HealthEntry>>,
}

impl HealthManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a witness with the neutral record.
    pub fn initialize(&self, strategy_id: &str) {
        self.entries
            .lock()
            .expect("health poisoned")
            .entry(strategy_id.to_string())
            .or_default();
    }

    /// Fold one trade outcome into the witness's record.
    pub fn record(&self, outcome: &TradeOutcome) {
        let mut entries = self.entries.lock().expect("health poisoned");
        let entry = entries.entry(outcome.strategy_id.clone()).or_default();
        entry.samples += 1;
        if outcome.is_win {
            entry.wins += 1;
        }
        entry.pnl_sum += outcome.pnl;
        let win_rate = entry.win_rate();
        let samples = entry.samples;
        drop(entries);
        info!(
            strategy = %outcome.strategy_id,
            win_rate,
            samples,
            "health updated"
        );
    }

    /// Current grade; unknown or under-sampled witnesses hold the neutral B.
    #[must_use]
    pub fn grade(&self, strategy_id: &str) -> HealthGrade {
        let entries = self.entries.lock().expect("health poisoned");
        entries
            .get(strategy_id)
            .map(|entry| grade_for(entry.win_rate(), entry.samples))
            .unwrap_or(HealthGrade::B)
    }

    /// Full health snapshot for a tracked witness.
    #[must_use]
    pub fn health(&self, strategy_id: &str) -> Option<WitnessHealth> {
        let entries = self.entries.lock().expect("health poisoned");
        entries.get(strategy_id).map(|entry| {
            let grade = grade_for(entry.win_rate(), entry.samples);
            WitnessHealth {
                strategy_id: strategy_id.to_string(),
                grade,
                win_rate: entry.win_rate(),
                sample_count: entry.samples,
                weight_scalar: grade.health_factor(),
            }
        })
    }

    /// Snapshot of all tracked witnesses.
    #[must_use]
    pub fn all(&self) -> HashMap<StrategyId, WitnessHealth> {
        let entries = self.entries.lock().expect("health poisoned");
        entries
            .iter()
            .map(|(id, entry)| {
                let grade = grade_for(entry.win_rate(), entry.samples);
                (
                    id.clone(),
                    WitnessHealth {
                        strategy_id: id.clone(),
                        grade,
                        win_rate: entry.win_rate(),
                        sample_count: entry.samples,
                        weight_scalar: grade.health_factor(),
                    },
                )
            })
            .collect()
    }

    /// Grade D with a sufficient sample size mandates a mute.
    #[must_use]
    pub fn auto_mute_due(&self, strategy_id: &str) -> bool {
        let entries = self.entries.lock().expect("health poisoned");
        entries
            .get(strategy_id)
            .map(|entry| {
                entry.samples >= MIN_SAMPLE_SIZE
                    && grade_for(entry.win_rate(), entry.samples) == HealthGrade::D
            })
            .unwrap_or(false)
    }
}

fn grade_for(win_rate: f64, samples: u64) -> HealthGrade {
    if samples < MIN_SAMPLE_SIZE {
        return HealthGrade::B;
    }
    if win_rate >= 0.55 {
        HealthGrade::A
    } else if win_rate >= 0.52 {
        HealthGrade::B
    } else if win_rate >= 0.30 {
        HealthGrade::C
    } else {
        HealthGrade::D
    }
}

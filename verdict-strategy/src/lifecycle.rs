//! Strategy lifecycle: NEW → TESTING → SHADOW → ACTIVE → (DEGRADED ↔
//! ACTIVE) → RETIRED, plus the auxiliary→core tier upgrade.
//!
//! Veto witnesses bypass this subsystem entirely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use verdict_core::{HealthGrade, LifecycleStatus, StrategyId, WitnessTier};
use verdict_journal::{AuditEvent, Journal, LifecycleChangeRecord};

use crate::event_witness::{EventDefinition, EventDefinitionWitness};
use crate::health::HealthManager;
use crate::panel::WitnessPanel;
use crate::shadow::ShadowRunner;
use crate::{PanelError, PanelResult};

/// Validation gate for TESTING → SHADOW.
pub const VALIDATION_MIN_WIN_RATE: f64 = 0.51;
pub const VALIDATION_MIN_SAMPLES: u64 = 100;
/// Continuous grade-A days required for the auxiliary→core upgrade.
pub const TIER_UPGRADE_DAYS: i64 = 30;
/// Days a degraded strategy may linger before retirement.
pub const DEGRADED_RETIRE_DAYS: i64 = 30;

/// Offline validation result attached to a hypothesis.
#[derive(Clone, Copy, Debug)]
pub struct ValidationStats {
    pub win_rate: f64,
    pub sample_count: u64,
}

impl ValidationStats {
    #[must_use]
    pub fn passes(&self) -> bool {
        self.win_rate >= VALIDATION_MIN_WIN_RATE && self.sample_count >= VALIDATION_MIN_SAMPLES
    }
}

struct HypothesisRecord {
    definition: EventDefinition,
    status: LifecycleStatus,
}

/// Outcome of one automatic lifecycle sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub demoted: Vec<StrategyId>,
    pub recovered: Vec<StrategyId>,
    pub retired: Vec<StrategyId>,
    pub muted: Vec<StrategyId>,
}

/// Drives strategy status changes against the panel, recording every change.
pub struct LifecycleManager {
    journal: Arc<dyn Journal>,
    hypotheses: Mutex<HashMap<StrategyId, HypothesisRecord>>,
    degraded_since: Mutex<HashMap<StrategyId, DateTime<Utc>>>,
    grade_a_since: Mutex<HashMap<StrategyId, DateTime<Utc>>>,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self {
            journal,
            hypotheses: Mutex::new(HashMap::new()),
            degraded_since: Mutex::new(HashMap::new()),
            grade_a_since: Mutex::new(HashMap::new()),
        }
    }

    /// Accept a discovered hypothesis. It enters NEW and immediately moves
    /// to TESTING.
    pub fn submit_hypothesis(&self, definition: EventDefinition, now: DateTime<Utc>) {
        let id = definition.strategy_id.clone();
        let mut hypotheses = self.hypotheses.lock().expect("lifecycle poisoned");
        hypotheses.insert(
            id.clone(),
            HypothesisRecord {
                definition,
                status: LifecycleStatus::Testing,
            },
        );
        drop(hypotheses);
        self.record(&id, None, LifecycleStatus::New, None, "hypothesis created", "discovery", now);
        self.record(
            &id,
            Some(LifecycleStatus::New),
            LifecycleStatus::Testing,
            None,
            "validation started",
            "lifecycle",
            now,
        );
        info!(strategy = %id, "hypothesis accepted for validation");
    }

    /// Current hypothesis-stage status, if the strategy is still pre-panel.
    #[must_use]
    pub fn hypothesis_status(&self, strategy_id: &str) -> Option<LifecycleStatus> {
        let hypotheses = self.hypotheses.lock().expect("lifecycle poisoned");
        hypotheses.get(strategy_id).map(|record| record.status)
    }

    /// TESTING → SHADOW when validation passes. Registers the declarative
    /// witness with the panel in shadow status and starts its shadow book.
    pub fn record_validation(
        &self,
        panel: &WitnessPanel,
        shadow: &ShadowRunner,
        strategy_id: &str,
        stats: ValidationStats,
        now: DateTime<Utc>,
    ) -> PanelResult<bool> {
        if !stats.passes() {
            info!(
                strategy = %strategy_id,
                win_rate = stats.win_rate,
                samples = stats.sample_count,
                "validation below the shadow gate"
            );
            return Ok(false);
        }
        let definition = {
            let mut hypotheses = self.hypotheses.lock().expect("lifecycle poisoned");
            let record = hypotheses
                .get_mut(strategy_id)
                .ok_or_else(|| PanelError::UnknownWitness(strategy_id.to_string()))?;
            if record.status != LifecycleStatus::Testing {
                return Ok(false);
            }
            record.status = LifecycleStatus::Shadow;
            record.definition.clone()
        };
        let witness = EventDefinitionWitness::new(definition).map_err(|err| {
            PanelError::ArchitectureViolation {
                strategy_id: strategy_id.to_string(),
                detail: err.to_string(),
            }
        })?;
        panel.register(Box::new(witness), LifecycleStatus::Shadow, "lifecycle")?;
        shadow.register(strategy_id, now);
        Ok(true)
    }

    /// Manual SHADOW → ACTIVE promotion, at the auxiliary tier by default.
    /// Requires the shadow promotion gate.
    pub fn promote_to_active(
        &self,
        panel: &WitnessPanel,
        shadow: &ShadowRunner,
        strategy_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> PanelResult<bool> {
        if panel.status(strategy_id)? != LifecycleStatus::Shadow {
            return Ok(false);
        }
        if !shadow.is_ready_for_promotion(strategy_id, now) {
            warn!(strategy = %strategy_id, "shadow performance below the promotion gate");
            return Ok(false);
        }
        panel.set_status(strategy_id, LifecycleStatus::Active, "shadow promotion", actor)?;
        panel.set_tier(strategy_id, WitnessTier::Auxiliary, actor)?;
        shadow.unregister(strategy_id);
        let mut hypotheses = self.hypotheses.lock().expect("lifecycle poisoned");
        if let Some(record) = hypotheses.get_mut(strategy_id) {
            record.status = LifecycleStatus::Active;
        }
        info!(strategy = %strategy_id, "promoted to active at auxiliary tier");
        Ok(true)
    }

    /// Manual auxiliary → core upgrade. Requires 30 days of continuous
    /// grade A, as tracked by the sweep.
    pub fn upgrade_tier(
        &self,
        panel: &WitnessPanel,
        health: &HealthManager,
        strategy_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> PanelResult<bool> {
        if panel.tier(strategy_id)? != WitnessTier::Auxiliary {
            return Ok(false);
        }
        if health.grade(strategy_id) != HealthGrade::A {
            return Ok(false);
        }
        let since = {
            let tracker = self.grade_a_since.lock().expect("lifecycle poisoned");
            tracker.get(strategy_id).copied()
        };
        let Some(since) = since else {
            return Ok(false);
        };
        if now - since < Duration::days(TIER_UPGRADE_DAYS) {
            return Ok(false);
        }
        panel.set_tier(strategy_id, WitnessTier::Core, actor)?;
        info!(strategy = %strategy_id, "upgraded to core tier");
        Ok(true)
    }

    /// Automatic demotion/recovery/retirement/mute pass over the panel.
    pub fn sweep(
        &self,
        panel: &WitnessPanel,
        health: &HealthManager,
        now: DateTime<Utc>,
    ) -> PanelResult<SweepReport> {
        let mut report = SweepReport::default();

        for id in panel.list_by_status(LifecycleStatus::Active) {
            if panel.tier(&id)? == WitnessTier::Veto {
                continue;
            }
            let grade = health.grade(&id);
            {
                let mut tracker = self.grade_a_since.lock().expect("lifecycle poisoned");
                if grade == HealthGrade::A {
                    tracker.entry(id.clone()).or_insert(now);
                } else {
                    tracker.remove(&id);
                }
            }
            if health.auto_mute_due(&id) && !panel.is_muted(&id)? {
                panel.mute(&id)?;
                warn!(strategy = %id, "auto-muted on grade D");
                report.muted.push(id.clone());
            }
            if grade == HealthGrade::D {
                panel.set_status(&id, LifecycleStatus::Degraded, "health grade D", "lifecycle")?;
                self.degraded_since
                    .lock()
                    .expect("lifecycle poisoned")
                    .insert(id.clone(), now);
                report.demoted.push(id);
            }
        }

        for id in panel.list_by_status(LifecycleStatus::Degraded) {
            let grade = health.grade(&id);
            if matches!(grade, HealthGrade::A | HealthGrade::B) {
                panel.set_status(&id, LifecycleStatus::Active, "health recovered", "lifecycle")?;
                if panel.is_muted(&id)? {
                    panel.unmute(&id)?;
                }
                self.degraded_since
                    .lock()
                    .expect("lifecycle poisoned")
                    .remove(&id);
                report.recovered.push(id);
                continue;
            }
            let degraded_at = {
                let mut tracker = self.degraded_since.lock().expect("lifecycle poisoned");
                *tracker.entry(id.clone()).or_insert(now)
            };
            if now - degraded_at >= Duration::days(DEGRADED_RETIRE_DAYS) {
                panel.set_status(&id, LifecycleStatus::Retired, "no recovery in 30 days", "lifecycle")?;
                self.degraded_since
                    .lock()
                    .expect("lifecycle poisoned")
                    .remove(&id);
                report.retired.push(id);
            }
        }

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        strategy_id: &str,
        from: Option<LifecycleStatus>,
        to: LifecycleStatus,
        tier: Option<WitnessTier>,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) {
        let record = LifecycleChangeRecord {
            strategy_id: strategy_id.to_string(),
            from,
            to,
            tier,
            reason: reason.to_string(),
            actor: actor.to_string(),
            correlation_id: Uuid::new_v4(),
            timestamp: now,
        };
        if let Err(err) = self
            .journal
            .append("lifecycle", &AuditEvent::LifecycleChange(record))
        {
            tracing::error!(error = %err, strategy = %strategy_id, "lifecycle audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_core::{ClaimType, Direction, TradeOutcome};
    use verdict_journal::MemoryJournal;

    use crate::event_witness::BarPredicate;

    fn definition(id: &str) -> EventDefinition {
        EventDefinition {
            strategy_id: id.into(),
            tier: WitnessTier::Auxiliary,
            claim_type: ClaimType::RegimeMatched,
            direction: Some(Direction::Long),
            confidence: 0.55,
            validity_window_secs: 60,
            predicate: BarPredicate::PriceChangeAbove {
                lookback: 3,
                threshold: 0.01,
            },
        }
    }

    fn setup() -> (LifecycleManager, WitnessPanel, ShadowRunner, Arc<HealthManager>) {
        let journal = Arc::new(MemoryJournal::new());
        (
            LifecycleManager::new(journal.clone()),
            WitnessPanel::new(journal),
            ShadowRunner::new(),
            Arc::new(HealthManager::new()),
        )
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
    fn hypothesis_flows_into_shadow_when_validation_passes() {
        let (lifecycle, panel, shadow, _) = setup();
        let now = Utc::now();
        lifecycle.submit_hypothesis(definition("h1"), now);
        assert_eq!(lifecycle.hypothesis_status("h1"), Some(LifecycleStatus::Testing));

        let weak = ValidationStats {
            win_rate: 0.50,
            sample_count: 200,
        };
        assert!(!lifecycle
            .record_validation(&panel, &shadow, "h1", weak, now)
            .unwrap());

        let passing = ValidationStats {
            win_rate: 0.53,
            sample_count: 150,
        };
        assert!(lifecycle
            .record_validation(&panel, &shadow, "h1", passing, now)
            .unwrap());
        assert_eq!(panel.status("h1").unwrap(), LifecycleStatus::Shadow);
        assert_eq!(shadow.strategy_count(), 1);
    }

    #[test]
    fn degraded_strategies_recover_or_retire() {
        let (lifecycle, panel, _, health) = setup();
        let now = Utc::now();
        lifecycle.submit_hypothesis(definition("h1"), now);
        lifecycle
            .record_validation(
                &panel,
                &ShadowRunner::new(),
                "h1",
                ValidationStats {
                    win_rate: 0.55,
                    sample_count: 150,
                },
                now,
            )
            .unwrap();
        panel
            .set_status("h1", LifecycleStatus::Active, "test", "test")
            .unwrap();

        // Grade D demotes.
        feed(&health, "h1", 10, 90);
        let report = lifecycle.sweep(&panel, &health, now).unwrap();
        assert_eq!(report.demoted, vec!["h1".to_string()]);
        assert_eq!(panel.status("h1").unwrap(), LifecycleStatus::Degraded);

        // Still degraded 31 days later with no recovery: retired.
        let later = now + Duration::days(31);
        let report = lifecycle.sweep(&panel, &health, later).unwrap();
        assert_eq!(report.retired, vec!["h1".to_string()]);
        assert_eq!(panel.status("h1").unwrap(), LifecycleStatus::Retired);

        // Retirement is absorbing.
        assert!(matches!(
            panel.set_status("h1", LifecycleStatus::Active, "x", "test"),
            Err(PanelError::Retired(_))
        ));
    }

    #[test]
    fn recovery_restores_active_status() {
        let (lifecycle, panel, _, health) = setup();
        let now = Utc::now();
        lifecycle.submit_hypothesis(definition("h1"), now);
        lifecycle
            .record_validation(
                &panel,
                &ShadowRunner::new(),
                "h1",
                ValidationStats {
                    win_rate: 0.55,
                    sample_count: 150,
                },
                now,
            )
            .unwrap();
        panel
            .set_status("h1", LifecycleStatus::Degraded, "test", "test")
            .unwrap();

        // Grade B (insufficient samples default) recovers the strategy.
        let report = lifecycle.sweep(&panel, &health, now).unwrap();
        assert_eq!(report.recovered, vec!["h1".to_string()]);
        assert_eq!(panel.status("h1").unwrap(), LifecycleStatus::Active);
    }

    #[test]
    fn tier_upgrade_needs_sustained_grade_a() {
        let (lifecycle, panel, shadow, health) = setup();
        let now = Utc::now();
        lifecycle.submit_hypothesis(definition("h1"), now);
        lifecycle
            .record_validation(
                &panel,
                &shadow,
                "h1",
                ValidationStats {
                    win_rate: 0.55,
                    sample_count: 150,
                },
                now,
            )
            .unwrap();
        panel
            .set_status("h1", LifecycleStatus::Active, "test", "test")
            .unwrap();
        feed(&health, "h1", 60, 40); // grade A

        // Sweep starts the grade-A clock.
        lifecycle.sweep(&panel, &health, now).unwrap();
        assert!(!lifecycle
            .upgrade_tier(&panel, &health, "h1", "admin", now + Duration::days(10))
            .unwrap());
        assert!(lifecycle
            .upgrade_tier(&panel, &health, "h1", "admin", now + Duration::days(31))
            .unwrap());
        assert_eq!(panel.tier("h1").unwrap(), WitnessTier::Core);
    }
}

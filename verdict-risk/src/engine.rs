//! The risk engine: runs every checker, aggregates by max severity, and
//! owns the lock/cooldown state.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use verdict_core::{RiskEventType, RiskLevel};
use verdict_journal::{AuditEvent, Journal, RiskEventRecord};

use crate::checkers::{
    AccountSurvivalChecker, BehaviorChecker, CheckerReport, ExecutionIntegrityChecker,
    RegimeChecker, RiskChecker, SystemChecker,
};
use crate::context::{RiskContext, RiskThresholds};

/// Cooldown dwell applied after a cooldown-level denial, by cause.
#[derive(Clone, Copy, Debug)]
pub struct CooldownDurations {
    pub normal_secs: u64,
    pub stop_loss_secs: u64,
    pub consecutive_loss_secs: u64,
}

impl Default for CooldownDurations {
    fn default() -> Self {
        Self {
            normal_secs: 600,
            stop_loss_secs: 1200,
            consecutive_loss_secs: 3600,
        }
    }
}

impl CooldownDurations {
    /// Pick the dwell matching the denial's dominant event.
    fn for_events(&self, events: &[RiskEventType]) -> u64 {
        if events.contains(&RiskEventType::ConsecutiveLoss) {
            self.consecutive_loss_secs
        } else if events.contains(&RiskEventType::DailyLossExceeded) {
            self.stop_loss_secs
        } else {
            self.normal_secs
        }
    }
}

/// Unified verdict over all domains.
#[derive(Clone, Debug)]
pub struct RiskDecision {
    pub approved: bool,
    pub level: RiskLevel,
    pub reason: Option<String>,
    pub domains: Vec<CheckerReport>,
}

#[derive(Debug)]
struct EngineState {
    current_level: RiskLevel,
    lock_reason: Option<String>,
    locked_at: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            current_level: RiskLevel::Normal,
            lock_reason: None,
            locked_at: None,
            cooldown_until: None,
        }
    }
}

/// Aggregates the domain checkers. Risk holds a hard veto: one denial
/// denies the loop, and a RiskLocked denial is terminal for the cycle.
pub struct RiskEngine {
    checkers: Vec<Box<dyn RiskChecker>>,
    journal: Arc<dyn Journal>,
    state: Mutex<EngineState>,
    cooldowns: CooldownDurations,
}

impl RiskEngine {
    /// Engine with the five default domain checkers.
    #[must_use]
    pub fn with_default_checkers(
        thresholds: RiskThresholds,
        cooldowns: CooldownDurations,
        journal: Arc<dyn Journal>,
    ) -> Self {
        let checkers: Vec<Box<dyn RiskChecker>> = vec![
            Box::new(AccountSurvivalChecker::new(thresholds)),
            Box::new(ExecutionIntegrityChecker::new(thresholds)),
            Box::new(RegimeChecker::new(thresholds)),
            Box::new(BehaviorChecker::new(thresholds)),
            Box::new(SystemChecker::new(thresholds)),
        ];
        Self::new(checkers, cooldowns, journal)
    }

    #[must_use]
    pub fn new(
        checkers: Vec<Box<dyn RiskChecker>>,
        cooldowns: CooldownDurations,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            checkers,
            journal,
            state: Mutex::new(EngineState::default()),
            cooldowns,
        }
    }

    /// Append an extra checker.
    pub fn add_checker(&mut self, checker: Box<dyn RiskChecker>) {
        self.checkers.push(checker);
    }

    #[must_use]
    pub fn current_level(&self) -> RiskLevel {
        self.state.lock().expect("risk state poisoned").current_level
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.current_level() == RiskLevel::RiskLocked
    }

    #[must_use]
    pub fn lock_reason(&self) -> Option<String> {
        self.state
            .lock()
            .expect("risk state poisoned")
            .lock_reason
            .clone()
    }

    #[must_use]
    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().expect("risk state poisoned").locked_at
    }

    /// Run all checkers and aggregate by max severity. All checkers run
    /// even after a denial so the journal carries every domain's view.
    pub fn check(&self, context: &RiskContext, correlation_id: Uuid) -> RiskDecision {
        {
            let state = self.state.lock().expect("risk state poisoned");
            if state.current_level == RiskLevel::RiskLocked {
                return RiskDecision {
                    approved: false,
                    level: RiskLevel::RiskLocked,
                    reason: Some(format!(
                        "system locked: {}",
                        state.lock_reason.as_deref().unwrap_or("unknown")
                    )),
                    domains: Vec::new(),
                };
            }
            if let Some(until) = state.cooldown_until {
                if context.now < until {
                    return RiskDecision {
                        approved: false,
                        level: RiskLevel::Cooldown,
                        reason: Some(format!("risk cooldown until {until}")),
                        domains: Vec::new(),
                    };
                }
            }
        }

        let mut domains = Vec::with_capacity(self.checkers.len());
        let mut level = RiskLevel::Normal;
        let mut denial: Option<(RiskLevel, String)> = None;
        for checker in &self.checkers {
            let report = checker.check(context);
            level = level.max(report.level);
            if !report.approved {
                let reason = report
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("{} denied", report.domain));
                warn!(domain = report.domain, level = ?report.level, %reason, "risk denial");
                match &denial {
                    Some((existing, _)) if existing.severity() >= report.level.severity() => {}
                    _ => denial = Some((report.level, reason)),
                }
            }
            for event in &report.events {
                let record = RiskEventRecord {
                    event_type: event.event_type,
                    level: event.level,
                    description: event.description.clone(),
                    value: event.value,
                    threshold: event.threshold,
                    correlation_id,
                    timestamp: context.now,
                };
                if let Err(err) = self
                    .journal
                    .append(checker.name(), &AuditEvent::RiskEvent(record))
                {
                    tracing::error!(error = %err, "risk event journal write failed");
                }
            }
            domains.push(report);
        }

        let denial_events: Vec<RiskEventType> = domains
            .iter()
            .filter(|report| !report.approved)
            .flat_map(|report| report.events.iter().map(|event| event.event_type))
            .collect();
        let mut state = self.state.lock().expect("risk state poisoned");
        state.current_level = level;
        if let Some((deny_level, reason)) = &denial {
            match deny_level {
                RiskLevel::RiskLocked => {
                    state.lock_reason = Some(reason.clone());
                    state.locked_at = Some(context.now);
                    warn!(%reason, "risk engine locked the system");
                }
                RiskLevel::Cooldown => {
                    let dwell = self.cooldowns.for_events(&denial_events);
                    state.cooldown_until =
                        Some(context.now + Duration::seconds(dwell as i64));
                }
                _ => {}
            }
            return RiskDecision {
                approved: false,
                level: *deny_level,
                reason: Some(reason.clone()),
                domains,
            };
        }

        RiskDecision {
            approved: true,
            level,
            reason: None,
            domains,
        }
    }

    /// Lock the engine without running checkers (external trigger).
    pub fn force_lock(&self, reason: &str, now: DateTime<Utc>) {
        let mut state = self.state.lock().expect("risk state poisoned");
        state.current_level = RiskLevel::RiskLocked;
        state.lock_reason = Some(reason.to_string());
        state.locked_at = Some(now);
        warn!(reason, "risk engine force-locked");
    }

    /// Reset after recovery completes. Only the recovery manager calls this.
    pub(crate) fn reset_to_normal(&self) {
        let mut state = self.state.lock().expect("risk state poisoned");
        state.current_level = RiskLevel::Normal;
        state.lock_reason = None;
        state.locked_at = None;
        state.cooldown_until = None;
        info!("risk engine reset to normal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_journal::MemoryJournal;

    fn engine() -> RiskEngine {
        RiskEngine::with_default_checkers(
            RiskThresholds::default(),
            CooldownDurations::default(),
            Arc::new(MemoryJournal::new()),
        )
    }

    #[test]
    fn all_domains_report_even_after_a_denial() {
        let engine = engine();
        let context = RiskContext {
            drawdown: 0.25,          // account: lock
            requested_position_pct: 0.08, // behavior: warning
            ..RiskContext::default()
        };
        let decision = engine.check(&context, Uuid::new_v4());
        assert!(!decision.approved);
        assert_eq!(decision.level, RiskLevel::RiskLocked);
        assert_eq!(decision.domains.len(), 5);
        assert!(engine.is_locked());
    }

    #[test]
    fn lock_denies_until_recovery() {
        let engine = engine();
        engine.force_lock("manual", Utc::now());
        let decision = engine.check(&RiskContext::default(), Uuid::new_v4());
        assert!(!decision.approved);
        assert_eq!(decision.level, RiskLevel::RiskLocked);

        engine.reset_to_normal();
        let decision = engine.check(&RiskContext::default(), Uuid::new_v4());
        assert!(decision.approved);
    }

    #[test]
    fn cooldown_denials_persist_for_the_window() {
        let engine = engine();
        let now = Utc::now();
        let context = RiskContext {
            consecutive_losses: 3,
            now,
            ..RiskContext::default()
        };
        let decision = engine.check(&context, Uuid::new_v4());
        assert_eq!(decision.level, RiskLevel::Cooldown);

        // Consecutive-loss denials carry the long dwell: a clean context
        // an hour in is still cooling down.
        let clean = RiskContext {
            now: now + Duration::seconds(3000),
            ..RiskContext::default()
        };
        let decision = engine.check(&clean, Uuid::new_v4());
        assert_eq!(decision.level, RiskLevel::Cooldown);
        assert!(!decision.approved);

        // After the window the engine re-evaluates.
        let later = RiskContext {
            now: now + Duration::seconds(3700),
            ..RiskContext::default()
        };
        assert!(engine.check(&later, Uuid::new_v4()).approved);
    }

    #[test]
    fn warnings_do_not_lock() {
        let engine = engine();
        let context = RiskContext {
            data_delay_ms: 8000,
            ..RiskContext::default()
        };
        let decision = engine.check(&context, Uuid::new_v4());
        assert!(!decision.approved);
        assert_eq!(decision.level, RiskLevel::Warning);
        assert!(!engine.is_locked());
    }
}

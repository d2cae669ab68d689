//! Single-writer state machine over the permitted transition table.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use verdict_core::SystemState;
use verdict_journal::{AuditEvent, Journal, StateTransitionRecord};

use crate::{StateError, StateResult};

/// The permitted `(from, to)` pairs, aside from the universal
/// `any -> RiskLocked` forced lock.
pub const PERMITTED_TRANSITIONS: &[(SystemState, SystemState)] = &[
    (SystemState::SystemInit, SystemState::Observing),
    (SystemState::Observing, SystemState::Eligible),
    (SystemState::Eligible, SystemState::ActiveTrading),
    (SystemState::Eligible, SystemState::Observing),
    (SystemState::ActiveTrading, SystemState::Cooldown),
    (SystemState::Cooldown, SystemState::Observing),
    (SystemState::RiskLocked, SystemState::Recovery),
    (SystemState::Recovery, SystemState::Observing),
];

/// Whether `(from, to)` is in the permitted set.
#[must_use]
pub fn is_valid_transition(from: SystemState, to: SystemState) -> bool {
    if from == to {
        return false;
    }
    if to == SystemState::RiskLocked {
        return true;
    }
    PERMITTED_TRANSITIONS.contains(&(from, to))
}

/// Accepted transition details.
#[derive(Clone, Debug)]
pub struct TransitionOutcome {
    pub from: SystemState,
    pub to: SystemState,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

struct Inner {
    state: SystemState,
    entered_at: DateTime<Utc>,
    history: Vec<TransitionOutcome>,
}

/// The single trading gatekeeper. Transition attempts are serialized behind
/// one mutex; every attempt — accepted or rejected — is journaled with
/// `(from, to, reason, actor, timestamp)`.
pub struct StateMachine {
    inner: Mutex<Inner>,
    journal: Arc<dyn Journal>,
}

impl StateMachine {
    #[must_use]
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SystemState::SystemInit,
                entered_at: Utc::now(),
                history: Vec::new(),
            }),
            journal,
        }
    }

    #[must_use]
    pub fn current_state(&self) -> SystemState {
        self.inner.lock().expect("state machine poisoned").state
    }

    /// Time spent in the current state.
    #[must_use]
    pub fn state_duration(&self, now: DateTime<Utc>) -> Duration {
        let inner = self.inner.lock().expect("state machine poisoned");
        now - inner.entered_at
    }

    #[must_use]
    pub fn is_trading_allowed(&self) -> bool {
        self.current_state().allows_trading()
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.current_state() == SystemState::RiskLocked
    }

    #[must_use]
    pub fn can_transition(&self, target: SystemState) -> bool {
        is_valid_transition(self.current_state(), target)
    }

    /// Recent accepted transitions, oldest first.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<TransitionOutcome> {
        let inner = self.inner.lock().expect("state machine poisoned");
        let skip = inner.history.len().saturating_sub(limit);
        inner.history[skip..].to_vec()
    }

    /// Attempt a transition. Atomic: concurrent attempts observe a
    /// consistent current state; rejections leave the state untouched and
    /// still produce an audit record.
    pub fn transition(
        &self,
        target: SystemState,
        reason: &str,
        actor: &str,
        correlation_id: Uuid,
    ) -> StateResult<TransitionOutcome> {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("state machine poisoned");
        let from = inner.state;
        let accepted = is_valid_transition(from, target);

        self.journal.append(
            "state_machine",
            &AuditEvent::StateTransition(StateTransitionRecord {
                from,
                to: target,
                accepted,
                reason: if accepted {
                    reason.to_string()
                } else {
                    format!("INVALID_TRANSITION: {reason}")
                },
                actor: actor.to_string(),
                correlation_id,
                timestamp: now,
            }),
        )?;

        if !accepted {
            warn!(%from, to = %target, reason, "transition rejected");
            return Err(StateError::InvalidTransition { from, to: target });
        }

        inner.state = target;
        inner.entered_at = now;
        let outcome = TransitionOutcome {
            from,
            to: target,
            reason: reason.to_string(),
            timestamp: now,
        };
        inner.history.push(outcome.clone());
        info!(%from, to = %target, reason, "state transition");
        Ok(outcome)
    }

    /// SYSTEM_INIT → OBSERVING once boot completes.
    pub fn complete_init(&self, correlation_id: Uuid) -> StateResult<TransitionOutcome> {
        self.transition(SystemState::Observing, "init complete", "system", correlation_id)
    }

    /// OBSERVING → ELIGIBLE when the verdict is tradeable and risk approved.
    pub fn become_eligible(&self, reason: &str, correlation_id: Uuid) -> StateResult<TransitionOutcome> {
        self.transition(SystemState::Eligible, reason, "state_machine", correlation_id)
    }

    /// ELIGIBLE → ACTIVE_TRADING; the only path that authorizes execution.
    pub fn authorize_execution(&self, reason: &str, correlation_id: Uuid) -> StateResult<TransitionOutcome> {
        self.transition(SystemState::ActiveTrading, reason, "state_machine", correlation_id)
    }

    /// ELIGIBLE → OBSERVING when the window lapses unexecuted.
    pub fn cancel_eligible(&self, reason: &str, correlation_id: Uuid) -> StateResult<TransitionOutcome> {
        self.transition(SystemState::Observing, reason, "state_machine", correlation_id)
    }

    /// ACTIVE_TRADING → COOLDOWN once execution settles.
    pub fn settle_execution(&self, reason: &str, correlation_id: Uuid) -> StateResult<TransitionOutcome> {
        self.transition(SystemState::Cooldown, reason, "state_machine", correlation_id)
    }

    /// COOLDOWN → OBSERVING after the cooldown timer expires.
    pub fn complete_cooldown(&self, correlation_id: Uuid) -> StateResult<TransitionOutcome> {
        self.transition(
            SystemState::Observing,
            "cooldown expired",
            "state_machine",
            correlation_id,
        )
    }

    /// Forced lock from any state (risk veto at lock severity).
    pub fn force_lock(&self, reason: &str, correlation_id: Uuid) -> StateResult<TransitionOutcome> {
        self.transition(SystemState::RiskLocked, reason, "risk_engine", correlation_id)
    }

    /// RISK_LOCKED → RECOVERY once an unlock is approved.
    pub fn approve_recovery(&self, reason: &str, correlation_id: Uuid) -> StateResult<TransitionOutcome> {
        self.transition(SystemState::Recovery, reason, "recovery", correlation_id)
    }

    /// RECOVERY → OBSERVING once recovery completes.
    pub fn complete_recovery(&self, correlation_id: Uuid) -> StateResult<TransitionOutcome> {
        self.transition(
            SystemState::Observing,
            "recovery complete",
            "recovery",
            correlation_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_journal::MemoryJournal;

    fn machine() -> (StateMachine, Arc<MemoryJournal>) {
        let journal = Arc::new(MemoryJournal::new());
        (StateMachine::new(journal.clone()), journal)
    }

    #[test]
    fn happy_path_walks_the_table() {
        let (machine, _) = machine();
        let id = Uuid::new_v4();
        machine.complete_init(id).unwrap();
        machine.become_eligible("tradeable", id).unwrap();
        machine.authorize_execution("go", id).unwrap();
        assert!(machine.is_trading_allowed());
        machine.settle_execution("settled", id).unwrap();
        machine.complete_cooldown(id).unwrap();
        assert_eq!(machine.current_state(), SystemState::Observing);
        assert_eq!(machine.history(10).len(), 5);
    }

    #[test]
    fn forbidden_transitions_are_rejected_and_audited() {
        let (machine, journal) = machine();
        let id = Uuid::new_v4();
        machine.complete_init(id).unwrap();
        machine.become_eligible("tradeable", id).unwrap();
        machine.authorize_execution("go", id).unwrap();
        machine.settle_execution("settled", id).unwrap();
        assert_eq!(machine.current_state(), SystemState::Cooldown);

        // COOLDOWN -> ACTIVE_TRADING is forbidden.
        let err = machine
            .transition(SystemState::ActiveTrading, "retry", "test", id)
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        assert_eq!(machine.current_state(), SystemState::Cooldown);

        let transitions = journal.stream("state_transitions");
        let last = transitions.last().unwrap();
        match last {
            AuditEvent::StateTransition(record) => {
                assert!(!record.accepted);
                assert!(record.reason.starts_with("INVALID_TRANSITION"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn lock_is_reachable_from_anywhere_and_exits_via_recovery() {
        let (machine, _) = machine();
        let id = Uuid::new_v4();
        machine.complete_init(id).unwrap();
        machine.force_lock("drawdown", id).unwrap();
        assert!(machine.is_locked());

        // RISK_LOCKED -> ELIGIBLE is forbidden.
        assert!(machine
            .transition(SystemState::Eligible, "skip recovery", "test", id)
            .is_err());

        machine.approve_recovery("manual unlock", id).unwrap();
        machine.complete_recovery(id).unwrap();
        assert_eq!(machine.current_state(), SystemState::Observing);
    }

    #[test]
    fn observing_cannot_jump_to_active_trading() {
        let (machine, _) = machine();
        let id = Uuid::new_v4();
        machine.complete_init(id).unwrap();
        assert!(machine
            .transition(SystemState::ActiveTrading, "jump", "test", id)
            .is_err());
    }

    #[test]
    fn self_transitions_are_rejected() {
        let (machine, _) = machine();
        let id = Uuid::new_v4();
        machine.complete_init(id).unwrap();
        assert!(machine
            .transition(SystemState::Observing, "noop", "test", id)
            .is_err());
    }
}

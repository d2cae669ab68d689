//! Witness registry and per-loop claim collection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use verdict_core::{Claim, LifecycleStatus, StrategyId, WitnessTier};
use verdict_journal::{AuditEvent, Journal, LifecycleChangeRecord};

use crate::witness::Witness;
use crate::{PanelError, PanelResult};

struct Entry {
    witness: Box<dyn Witness>,
    tier: WitnessTier,
    status: LifecycleStatus,
    muted: bool,
    error_count: u64,
}

/// Claims collected from one loop, split by routing target.
#[derive(Debug, Default)]
pub struct PanelCollection {
    /// Claims from active witnesses, bound for the aggregator.
    pub claims: Vec<Claim>,
    /// Claims from shadow witnesses, bound for the shadow recorder only.
    pub shadow_claims: Vec<Claim>,
    /// Witnesses that errored this loop.
    pub errored: Vec<StrategyId>,
    /// Witnesses skipped because the loop time budget ran out.
    pub budget_skipped: usize,
}

/// Owns the set of registered witnesses and routes bars to them.
///
/// A single witness error is isolated: the panel logs it, marks no claim,
/// and continues with the remainder.
pub struct WitnessPanel {
    entries: Mutex<HashMap<StrategyId, Entry>>,
    journal: Arc<dyn Journal>,
    invalid_claims: AtomicU64,
}

impl WitnessPanel {
    #[must_use]
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            journal,
            invalid_claims: AtomicU64::new(0),
        }
    }

    /// Register a witness after validating its declared claim surface
    /// against its tier. Capability enforcement happens here, not at
    /// claim time.
    pub fn register(
        &self,
        witness: Box<dyn Witness>,
        status: LifecycleStatus,
        actor: &str,
    ) -> PanelResult<()> {
        let descriptor = witness.descriptor().clone();
        if descriptor.claim_types.is_empty() {
            return Err(PanelError::ArchitectureViolation {
                strategy_id: descriptor.id,
                detail: "witness declares no claim types".into(),
            });
        }
        for claim_type in &descriptor.claim_types {
            if !descriptor.tier.allows(*claim_type) {
                return Err(PanelError::ArchitectureViolation {
                    strategy_id: descriptor.id,
                    detail: format!(
                        "tier {} may not emit {claim_type:?}",
                        descriptor.tier
                    ),
                });
            }
        }
        if descriptor.tier == WitnessTier::Veto && descriptor.directional {
            return Err(PanelError::ArchitectureViolation {
                strategy_id: descriptor.id,
                detail: "veto witnesses may not assert a direction".into(),
            });
        }

        let mut entries = self.entries.lock().expect("panel poisoned");
        if entries.contains_key(&descriptor.id) {
            warn!(strategy = %descriptor.id, "duplicate registration; replacing previous witness");
        }
        entries.insert(
            descriptor.id.clone(),
            Entry {
                witness,
                tier: descriptor.tier,
                status,
                muted: false,
                error_count: 0,
            },
        );
        drop(entries);
        self.record_change(&descriptor.id, None, status, Some(descriptor.tier), "registered", actor)?;
        Ok(())
    }

    /// Remove a witness. Veto witnesses cannot be unregistered.
    pub fn unregister(&self, strategy_id: &str, actor: &str) -> PanelResult<()> {
        let mut entries = self.entries.lock().expect("panel poisoned");
        let entry = entries
            .get(strategy_id)
            .ok_or_else(|| PanelError::UnknownWitness(strategy_id.to_string()))?;
        if entry.tier == WitnessTier::Veto {
            return Err(PanelError::VetoProtected(strategy_id.to_string()));
        }
        let previous = entry.status;
        entries.remove(strategy_id);
        drop(entries);
        self.record_change(
            strategy_id,
            Some(previous),
            LifecycleStatus::Retired,
            None,
            "unregistered",
            actor,
        )?;
        Ok(())
    }

    /// Change a witness's lifecycle status. Veto witnesses bypass the
    /// lifecycle subsystem entirely; `Retired` is terminal.
    pub fn set_status(
        &self,
        strategy_id: &str,
        status: LifecycleStatus,
        reason: &str,
        actor: &str,
    ) -> PanelResult<()> {
        let mut entries = self.entries.lock().expect("panel poisoned");
        let entry = entries
            .get_mut(strategy_id)
            .ok_or_else(|| PanelError::UnknownWitness(strategy_id.to_string()))?;
        if entry.tier == WitnessTier::Veto {
            return Err(PanelError::VetoProtected(strategy_id.to_string()));
        }
        if entry.status.is_terminal() {
            return Err(PanelError::Retired(strategy_id.to_string()));
        }
        let previous = entry.status;
        entry.status = status;
        let tier = entry.tier;
        drop(entries);
        self.record_change(strategy_id, Some(previous), status, Some(tier), reason, actor)?;
        Ok(())
    }

    /// Move a witness between the core and auxiliary tiers. Denied when the
    /// witness is veto-tier or the target is the veto tier.
    pub fn set_tier(&self, strategy_id: &str, tier: WitnessTier, actor: &str) -> PanelResult<()> {
        if tier == WitnessTier::Veto {
            return Err(PanelError::ArchitectureViolation {
                strategy_id: strategy_id.to_string(),
                detail: "witnesses cannot be promoted into the veto tier".into(),
            });
        }
        let mut entries = self.entries.lock().expect("panel poisoned");
        let entry = entries
            .get_mut(strategy_id)
            .ok_or_else(|| PanelError::UnknownWitness(strategy_id.to_string()))?;
        if entry.tier == WitnessTier::Veto {
            return Err(PanelError::VetoProtected(strategy_id.to_string()));
        }
        let status = entry.status;
        entry.tier = tier;
        drop(entries);
        self.record_change(strategy_id, Some(status), status, Some(tier), "tier change", actor)?;
        Ok(())
    }

    /// Suppress claim emission without changing lifecycle status.
    pub fn mute(&self, strategy_id: &str) -> PanelResult<()> {
        self.set_muted(strategy_id, true)
    }

    /// Lift a mute.
    pub fn unmute(&self, strategy_id: &str) -> PanelResult<()> {
        self.set_muted(strategy_id, false)
    }

    fn set_muted(&self, strategy_id: &str, muted: bool) -> PanelResult<()> {
        let mut entries = self.entries.lock().expect("panel poisoned");
        let entry = entries
            .get_mut(strategy_id)
            .ok_or_else(|| PanelError::UnknownWitness(strategy_id.to_string()))?;
        entry.muted = muted;
        Ok(())
    }

    /// Whether the witness is currently muted.
    pub fn is_muted(&self, strategy_id: &str) -> PanelResult<bool> {
        let entries = self.entries.lock().expect("panel poisoned");
        entries
            .get(strategy_id)
            .map(|entry| entry.muted)
            .ok_or_else(|| PanelError::UnknownWitness(strategy_id.to_string()))
    }

    /// Current lifecycle status of a witness.
    pub fn status(&self, strategy_id: &str) -> PanelResult<LifecycleStatus> {
        let entries = self.entries.lock().expect("panel poisoned");
        entries
            .get(strategy_id)
            .map(|entry| entry.status)
            .ok_or_else(|| PanelError::UnknownWitness(strategy_id.to_string()))
    }

    /// Current effective tier of a witness.
    pub fn tier(&self, strategy_id: &str) -> PanelResult<WitnessTier> {
        let entries = self.entries.lock().expect("panel poisoned");
        entries
            .get(strategy_id)
            .map(|entry| entry.tier)
            .ok_or_else(|| PanelError::UnknownWitness(strategy_id.to_string()))
    }

    /// Ids of witnesses currently holding the given tier, sorted.
    #[must_use]
    pub fn list_by_tier(&self, tier: WitnessTier) -> Vec<StrategyId> {
        let entries = self.entries.lock().expect("panel poisoned");
        let mut ids: Vec<StrategyId> = entries
            .iter()
            .filter(|(_, entry)| entry.tier == tier)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of witnesses currently in the given lifecycle status, sorted.
    #[must_use]
    pub fn list_by_status(&self, status: LifecycleStatus) -> Vec<StrategyId> {
        let entries = self.entries.lock().expect("panel poisoned");
        let mut ids: Vec<StrategyId> = entries
            .iter()
            .filter(|(_, entry)| entry.status == status)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered witnesses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("panel poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claims dropped because their type was outside the tier whitelist or
    /// a field was out of range.
    #[must_use]
    pub fn invalid_claim_count(&self) -> u64 {
        self.invalid_claims.load(Ordering::Relaxed)
    }

    /// Route a bar slice to every eligible witness and collect claims.
    ///
    /// Witnesses are visited in id order for determinism. Muted and
    /// non-active witnesses (other than shadow) are skipped; shadow claims
    /// are tagged for the shadow recorder and never reach the aggregator.
    pub fn collect(
        &self,
        bars: &[verdict_core::Bar],
        budget: Duration,
    ) -> PanelCollection {
        let started = Instant::now();
        let mut collection = PanelCollection::default();
        let mut entries = self.entries.lock().expect("panel poisoned");
        let mut ids: Vec<StrategyId> = entries.keys().cloned().collect();
        ids.sort();

        for (index, id) in ids.iter().enumerate() {
            if started.elapsed() > budget {
                collection.budget_skipped = ids.len() - index;
                warn!(
                    skipped = collection.budget_skipped,
                    budget_ms = budget.as_millis() as u64,
                    "panel time budget exhausted"
                );
                break;
            }
            let entry = entries.get_mut(id).expect("id drawn from map");
            let shadow = entry.status == LifecycleStatus::Shadow;
            if entry.muted || (entry.status != LifecycleStatus::Active && !shadow) {
                debug!(strategy = %id, status = %entry.status, muted = entry.muted, "witness skipped");
                continue;
            }
            match entry.witness.generate_claim(bars) {
                Ok(Some(mut claim)) => {
                    claim.tier = entry.tier;
                    if !entry.tier.allows(claim.claim_type)
                        || !(0.0..=1.0).contains(&claim.confidence)
                    {
                        self.invalid_claims.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            strategy = %id,
                            claim_type = ?claim.claim_type,
                            "claim dropped: outside declared surface"
                        );
                        continue;
                    }
                    if shadow {
                        collection.shadow_claims.push(claim);
                    } else {
                        collection.claims.push(claim);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    entry.error_count += 1;
                    collection.errored.push(id.clone());
                    warn!(strategy = %id, error = %err, "witness failed; continuing with remainder");
                }
            }
        }
        collection
    }

    fn record_change(
        &self,
        strategy_id: &str,
        from: Option<LifecycleStatus>,
        to: LifecycleStatus,
        tier: Option<WitnessTier>,
        reason: &str,
        actor: &str,
    ) -> PanelResult<()> {
        self.record_change_at(strategy_id, from, to, tier, reason, actor, Utc::now())
    }

    fn record_change_at(
        &self,
        strategy_id: &str,
        from: Option<LifecycleStatus>,
        to: LifecycleStatus,
        tier: Option<WitnessTier>,
        reason: &str,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> PanelResult<()> {
        self.journal.append(
            "panel",
            &AuditEvent::LifecycleChange(LifecycleChangeRecord {
                strategy_id: strategy_id.to_string(),
                from,
                to,
                tier,
                reason: reason.to_string(),
                actor: actor.to_string(),
                correlation_id: Uuid::new_v4(),
                timestamp,
            }),
        )?;
        Ok(())
    }
}

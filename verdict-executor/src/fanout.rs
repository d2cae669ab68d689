//! Parallel broadcast of one authorized decision to every eligible user.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use verdict_core::{ExecutionFlag, ExecutionReport, OrderId, TradingDecision, UserId};
use verdict_journal::{AuditEvent, Journal, UserProfitRecord};

use crate::context::{SkipReason, UserContext};

/// Deadlines governing the fan-out.
#[derive(Clone, Copy, Debug)]
pub struct FanoutSettings {
    /// Overall deadline for one decision across all users.
    pub decision_deadline: Duration,
    /// Deadline for each individual exchange call.
    pub order_call_timeout: Duration,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            decision_deadline: Duration::from_secs(30),
            order_call_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of broadcasting one decision.
#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    pub decision_id: Option<Uuid>,
    pub reports: HashMap<UserId, ExecutionReport>,
    pub skipped: HashMap<UserId, SkipReason>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Owns the user context map and fans decisions out, one task per user.
///
/// Contexts are moved into their task by value and returned when it
/// completes, so each is owned by exactly one task at a time.
pub struct MultiUserExecutor {
    contexts: tokio::sync::Mutex<HashMap<UserId, UserContext>>,
    replay_cache: Mutex<HashMap<(UserId, OrderId), ExecutionReport>>,
    journal: Arc<dyn Journal>,
    settings: FanoutSettings,
}

impl MultiUserExecutor {
    #[must_use]
    pub fn new(settings: FanoutSettings, journal: Arc<dyn Journal>) -> Self {
        Self {
            contexts: tokio::sync::Mutex::new(HashMap::new()),
            replay_cache: Mutex::new(HashMap::new()),
            journal,
            settings,
        }
    }

    /// Register an activated user context.
    pub async fn add_user(&self, context: UserContext) {
        let mut contexts = self.contexts.lock().await;
        let user_id = context.user_id().to_string();
        if contexts.insert(user_id.clone(), context).is_some() {
            warn!(user = %user_id, "replacing existing user context");
        }
    }

    /// Remove a user; the context is destroyed and its credentials zeroed.
    pub async fn remove_user(&self, user_id: &str) -> bool {
        let mut contexts = self.contexts.lock().await;
        match contexts.remove(user_id) {
            Some(context) => {
                context.shutdown();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub async fn user_count(&self) -> usize {
        self.contexts.lock().await.len()
    }

    /// Apply a settled trade result to one user's risk state and journal
    /// the profit record. Other users are untouched.
    pub async fn apply_trade_result(&self, user_id: &str, pnl_ratio: f64, correlation_id: Uuid) {
        let mut contexts = self.contexts.lock().await;
        let Some(context) = contexts.get_mut(user_id) else {
            return;
        };
        if pnl_ratio >= 0.0 {
            context.risk_state.record_win();
        } else {
            context.risk_state.record_loss(-pnl_ratio);
        }
        let record = UserProfitRecord {
            user_id: user_id.to_string(),
            pnl: pnl_ratio,
            equity_after: Some(context.equity * (1.0 + pnl_ratio)),
            correlation_id,
            timestamp: chrono::Utc::now(),
        };
        if let Err(err) = self.journal.append("executor", &AuditEvent::UserProfit(record)) {
            error!(error = %err, user = %user_id, "user profit journal write failed");
        }
    }

    /// Broadcast one authorized decision. Eligible users execute in
    /// parallel under the decision deadline; a duplicate `(user, order_id)`
    /// submission replays the cached report without touching the exchange.
    pub async fn broadcast(&self, decision: &TradingDecision) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome {
            decision_id: Some(decision.id),
            ..BroadcastOutcome::default()
        };

        // Pull eligible contexts out of the map; ownership moves into the
        // per-user tasks.
        let mut eligible: Vec<(UserContext, OrderId)> = Vec::new();
        {
            let mut contexts = self.contexts.lock().await;
            let user_ids: Vec<UserId> = contexts.keys().cloned().collect();
            for user_id in user_ids {
                let order_id = order_id_for(decision, &user_id);
                let cached = {
                    let cache = self.replay_cache.lock().expect("replay cache poisoned");
                    cache.get(&(user_id.clone(), order_id.clone())).cloned()
                };
                if let Some(mut report) = cached {
                    report.flags.insert(ExecutionFlag::DuplicateReplay);
                    outcome.reports.insert(user_id, report);
                    continue;
                }
                let context = contexts.get(&user_id).expect("id drawn from map");
                match context.eligibility(decision) {
                    Ok(()) => {
                        let context = contexts.remove(&user_id).expect("id drawn from map");
                        eligible.push((context, order_id));
                    }
                    Err(reason) => {
                        outcome.skipped.insert(user_id, reason);
                    }
                }
            }
        }

        if eligible.is_empty() {
            info!(decision = %decision.id, "no eligible users for decision");
            return outcome;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let deadline = self.settings.decision_deadline;
        let deadline_task = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = cancel_tx.send(true);
            // Keep the sender alive until after the send.
            cancel_tx
        });

        let mut handles = Vec::with_capacity(eligible.len());
        for (mut context, order_id) in eligible {
            let decision = decision.clone();
            let journal = Arc::clone(&self.journal);
            let cancel = cancel_rx.clone();
            let call_timeout = self.settings.order_call_timeout;
            handles.push(tokio::spawn(async move {
                let report = context
                    .execute(&decision, order_id, call_timeout, cancel, &journal)
                    .await;
                (context, report)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((context, report)) => {
                    let user_id = context.user_id().to_string();
                    if report.is_success() {
                        outcome.succeeded += 1;
                    } else {
                        outcome.failed += 1;
                    }
                    {
                        let mut cache = self.replay_cache.lock().expect("replay cache poisoned");
                        cache.insert((user_id.clone(), report.order_id.clone()), report.clone());
                    }
                    outcome.reports.insert(user_id.clone(), report);
                    self.contexts.lock().await.insert(user_id, context);
                }
                Err(join_err) => {
                    // The context is lost with the task; isolate and move on.
                    error!(error = %join_err, "user execution task failed");
                    outcome.failed += 1;
                }
            }
        }
        deadline_task.abort();

        info!(
            decision = %decision.id,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            skipped = outcome.skipped.len(),
            "broadcast complete"
        );
        outcome
    }
}

fn order_id_for(decision: &TradingDecision, user_id: &str) -> OrderId {
    format!("{}-{user_id}", decision.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use verdict_broker::PaperExchangeClient;
    use verdict_core::{Direction, OrderStatus, TradeRegime};
    use verdict_journal::MemoryJournal;

    use crate::user::{SubscriptionTier, UserCredentials, UserProfile, UserRiskState, UserStatus};

    fn decision() -> TradingDecision {
        TradingDecision {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            direction: Direction::Long,
            confidence: 0.75,
            position_pct: 0.02,
            reference_price: 50_000.0,
            stop_loss_pct: None,
            take_profit_pct: None,
            regime: TradeRegime::NoRegime,
            created_at: Utc::now(),
        }
    }

    fn paper_user(user_id: &str) -> UserContext {
        let client = PaperExchangeClient::default();
        client.update_price("BTCUSDT", 50_000.0);
        UserContext::new(
            UserProfile {
                user_id: user_id.into(),
                status: UserStatus::Active,
                subscription: SubscriptionTier::Pro,
                leverage: 3.0,
                max_position_pct: 0.02,
            },
            UserCredentials::new("key".into(), "secret".into()),
            UserRiskState::default(),
            Arc::new(client),
            10_000.0,
        )
    }

    fn executor() -> MultiUserExecutor {
        MultiUserExecutor::new(FanoutSettings::default(), Arc::new(MemoryJournal::new()))
    }

    #[tokio::test]
    async fn broadcast_fills_for_eligible_users() {
        let executor = executor();
        executor.add_user(paper_user("user-a")).await;
        executor.add_user(paper_user("user-b")).await;

        let outcome = executor.broadcast(&decision()).await;
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.reports["user-a"].is_success());
        // Contexts returned to the map.
        assert_eq!(executor.user_count().await, 2);
    }

    #[tokio::test]
    async fn duplicate_decision_replays_cached_reports() {
        let executor = executor();
        executor.add_user(paper_user("user-a")).await;
        let decision = decision();

        let first = executor.broadcast(&decision).await;
        let second = executor.broadcast(&decision).await;

        let original = &first.reports["user-a"];
        let replay = &second.reports["user-a"];
        assert_eq!(replay.executed_price, original.executed_price);
        assert_eq!(replay.status, OrderStatus::Filled);
        assert!(replay.flags.contains(&ExecutionFlag::DuplicateReplay));
        // The replay produced no second execution.
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.failed, 0);
    }

    #[tokio::test]
    async fn locked_users_are_skipped() {
        let executor = executor();
        let mut locked = paper_user("user-locked");
        locked.risk_state.lock("test");
        executor.add_user(locked).await;
        executor.add_user(paper_user("user-a")).await;

        let outcome = executor.broadcast(&decision()).await;
        assert_eq!(outcome.skipped["user-locked"], SkipReason::RiskLocked);
        assert!(outcome.reports["user-a"].is_success());
    }

    #[tokio::test]
    async fn trade_results_only_touch_their_user() {
        let executor = executor();
        executor.add_user(paper_user("user-a")).await;
        executor.add_user(paper_user("user-b")).await;

        executor.apply_trade_result("user-a", -0.02, Uuid::new_v4()).await;

        let contexts = executor.contexts.lock().await;
        assert_eq!(contexts["user-a"].risk_state.consecutive_losses, 1);
        assert_eq!(contexts["user-b"].risk_state.consecutive_losses, 0);
    }
}

//! One user's isolated execution environment.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};
#[cfg(test)]
use uuid::Uuid;

use verdict_broker::ExchangeClient;
use verdict_core::{
    Direction, ExecutionFlag, ExecutionReport, OrderId, OrderRequest, OrderType, TradingDecision,
};
use verdict_journal::{AuditEvent, Journal, OrderRecord};

use crate::crypto::CredentialsCipher;
use crate::user::{
    EncryptedCredentials, UserCredentials, UserProfile, UserRiskLimits, UserRiskState, UserStatus,
};
use crate::ExecutorResult;

/// Why a user was skipped before execution. Order matters and mirrors the
/// eligibility filter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    Inactive,
    InvalidCredentials,
    RiskLocked,
    SubscriptionCap,
}

/// Sized order quantity: a pure function of the decision and user state.
/// Never consults, let alone mutates, global state.
#[must_use]
pub fn sized_quantity(decision: &TradingDecision, equity: f64, user_cap: f64) -> f64 {
    if decision.reference_price <= 0.0 || equity <= 0.0 {
        return 0.0;
    }
    let fraction = decision.position_pct.min(user_cap).max(0.0);
    let notional = equity * fraction;
    let quantity = notional / decision.reference_price;
    // Exchange lot precision.
    (quantity * 1000.0).floor() / 1000.0
}

/// Everything one user needs to execute: profile, decrypted credentials,
/// risk state, and an exchange client. Owned by one task at a time; the
/// fan-out moves it in and out by value.
pub struct UserContext {
    pub profile: UserProfile,
    credentials: UserCredentials,
    pub risk_state: UserRiskState,
    client: Arc<dyn ExchangeClient>,
    pub equity: f64,
    credentials_valid: bool,
    limits: UserRiskLimits,
}

impl UserContext {
    /// Build a context from already-decrypted credentials (tests, replay).
    #[must_use]
    pub fn new(
        profile: UserProfile,
        credentials: UserCredentials,
        risk_state: UserRiskState,
        client: Arc<dyn ExchangeClient>,
        equity: f64,
    ) -> Self {
        let credentials_valid = !credentials.is_wiped();
        Self {
            profile,
            credentials,
            risk_state,
            client,
            equity,
            credentials_valid,
            limits: UserRiskLimits::default(),
        }
    }

    /// Activate a user: decrypt the stored envelopes into memory.
    pub fn activate(
        cipher: &CredentialsCipher,
        profile: UserProfile,
        stored: &EncryptedCredentials,
        client: Arc<dyn ExchangeClient>,
        equity: f64,
    ) -> ExecutorResult<Self> {
        let api_key = cipher.decrypt(&stored.api_key)?;
        let api_secret = cipher.decrypt(&stored.api_secret)?;
        let mut context = Self::new(
            profile,
            UserCredentials::new(api_key, api_secret),
            UserRiskState::default(),
            client,
            equity,
        );
        context.credentials_valid =
            stored.is_valid && !context.credentials.is_wiped();
        info!(user = %context.profile.user_id, "user context activated");
        Ok(context)
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.profile.user_id
    }

    /// Expose the decrypted API key for the exchange client signer. Never
    /// logged, never serialized.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.credentials.api_key.expose()
    }

    /// Ordered, short-circuiting eligibility filter.
    pub fn eligibility(&self, decision: &TradingDecision) -> Result<(), SkipReason> {
        if self.profile.status != UserStatus::Active {
            return Err(SkipReason::Inactive);
        }
        if !self.credentials_valid {
            return Err(SkipReason::InvalidCredentials);
        }
        if self.risk_state.is_locked {
            return Err(SkipReason::RiskLocked);
        }
        if decision.position_pct > self.profile.subscription.max_position_pct() {
            return Err(SkipReason::SubscriptionCap);
        }
        Ok(())
    }

    /// Destroy the context, zeroing credentials.
    pub fn shutdown(mut self) {
        self.credentials.wipe();
        self.credentials_valid = false;
        info!(user = %self.profile.user_id, "user context destroyed, credentials wiped");
    }

    /// Whether the decrypted credentials have been zeroed.
    #[must_use]
    pub fn credentials_wiped(&self) -> bool {
        self.credentials.is_wiped()
    }

    /// Execute one decision for this user. All failure paths produce a
    /// report; nothing here can affect another user.
    pub(crate) async fn execute(
        &mut self,
        decision: &TradingDecision,
        order_id: OrderId,
        call_timeout: Duration,
        mut cancel: watch::Receiver<bool>,
        journal: &Arc<dyn Journal>,
    ) -> ExecutionReport {
        let now = Utc::now();
        let user_id = self.profile.user_id.clone();

        if let Err(reason) = self.risk_state.check(&self.limits) {
            let report = ExecutionReport::failure(
                user_id,
                order_id,
                format!("user risk denied: {reason}"),
                [ExecutionFlag::RiskLockedTriggered],
                now,
            );
            self.journal_report(&report, decision, journal);
            return report;
        }

        let quantity = sized_quantity(decision, self.equity, self.profile.max_position_pct);
        if quantity <= 0.0 {
            let report =
                ExecutionReport::failure(user_id, order_id, "sized quantity is zero", [], now);
            self.journal_report(&report, decision, journal);
            return report;
        }

        let request = OrderRequest {
            symbol: decision.symbol.clone(),
            side: decision.direction.entry_side(),
            order_type: OrderType::Market,
            quantity,
            price: Some(decision.reference_price),
            client_order_id: Some(order_id.clone()),
        };
        let order_record = OrderRecord {
            user_id: user_id.clone(),
            order_id: order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity,
            price: request.price,
            correlation_id: decision.id,
            timestamp: now,
        };
        if let Err(err) = journal.append("executor", &AuditEvent::Order(order_record)) {
            tracing::error!(error = %err, user = %user_id, "order journal write failed");
        }

        if *cancel.borrow() {
            let report = self.canceled_report(&user_id, &order_id);
            self.journal_report(&report, decision, journal);
            return report;
        }

        enum CallOutcome {
            Canceled,
            Settled(Result<verdict_broker::BrokerResult<verdict_core::ExchangeOrderResult>, tokio::time::error::Elapsed>),
        }

        let client = Arc::clone(&self.client);
        let call = tokio::select! {
            // Deadline fired: abandon the in-flight call, no retry.
            _ = cancel.changed() => CallOutcome::Canceled,
            outcome = tokio::time::timeout(call_timeout, client.place_order(request)) => {
                CallOutcome::Settled(outcome)
            }
        };

        let report = match call {
            CallOutcome::Canceled => self.canceled_report(&user_id, &order_id),
            CallOutcome::Settled(Ok(Ok(result))) => {
                self.risk_state.reset_timeouts();
                let slippage = signed_slippage(
                    decision.direction,
                    decision.reference_price,
                    result.executed_price,
                );
                ExecutionReport {
                    user_id: user_id.clone(),
                    order_id: order_id.clone(),
                    status: result.status,
                    executed_quantity: result.executed_quantity,
                    executed_price: result.executed_price,
                    slippage,
                    commission: result.commission,
                    flags: Default::default(),
                    error: None,
                    timestamp: Utc::now(),
                }
            }
            CallOutcome::Settled(Ok(Err(err))) => {
                warn!(user = %user_id, error = %err, "order rejected");
                ExecutionReport::failure(user_id.clone(), order_id.clone(), err.to_string(), [], Utc::now())
            }
            CallOutcome::Settled(Err(_elapsed)) => {
                self.risk_state.record_timeout(&self.limits);
                let mut flags = vec![ExecutionFlag::Timeout];
                if self.risk_state.is_locked {
                    flags.push(ExecutionFlag::RiskLockedTriggered);
                }
                warn!(user = %user_id, "order call deadline missed");
                ExecutionReport::failure(
                    user_id.clone(),
                    order_id.clone(),
                    "exchange call timed out",
                    flags,
                    Utc::now(),
                )
            }
        };

        self.journal_report(&report, decision, journal);
        report
    }

    fn canceled_report(&self, user_id: &str, order_id: &str) -> ExecutionReport {
        let mut report = ExecutionReport::failure(
            user_id,
            order_id,
            "decision deadline reached",
            [ExecutionFlag::Canceled],
            Utc::now(),
        );
        report.status = verdict_core::OrderStatus::Canceled;
        report
    }

    fn journal_report(
        &self,
        report: &ExecutionReport,
        decision: &TradingDecision,
        journal: &Arc<dyn Journal>,
    ) {
        let record = verdict_journal::ExecutionRecord {
            report: report.clone(),
            correlation_id: decision.id,
        };
        if let Err(err) = journal.append("executor", &AuditEvent::Execution(record)) {
            tracing::error!(error = %err, user = %report.user_id, "execution journal write failed");
        }
    }
}

fn signed_slippage(direction: Direction, reference: f64, executed: f64) -> f64 {
    if reference <= 0.0 {
        return 0.0;
    }
    match direction {
        Direction::Long => (executed - reference) / reference,
        Direction::Short => (reference - executed) / reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_broker::PaperExchangeClient;
    use verdict_core::TradeRegime;

    fn decision(position_pct: f64) -> TradingDecision {
        TradingDecision {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            direction: Direction::Long,
            confidence: 0.75,
            position_pct,
            reference_price: 50_000.0,
            stop_loss_pct: Some(0.01),
            take_profit_pct: Some(0.02),
            regime: TradeRegime::NoRegime,
            created_at: Utc::now(),
        }
    }

    fn profile(status: UserStatus) -> UserProfile {
        UserProfile {
            user_id: "user-a".into(),
            status,
            subscription: crate::user::SubscriptionTier::Pro,
            leverage: 3.0,
            max_position_pct: 0.02,
        }
    }

    fn context(status: UserStatus) -> UserContext {
        UserContext::new(
            profile(status),
            UserCredentials::new("key".into(), "secret".into()),
            UserRiskState::default(),
            Arc::new(PaperExchangeClient::default()),
            10_000.0,
        )
    }

    #[test]
    fn sizing_is_pure_and_capped() {
        let decision = decision(0.05);
        // User cap of 2% binds before the decision's 5%.
        let qty = sized_quantity(&decision, 10_000.0, 0.02);
        assert!((qty - 0.004).abs() < 1e-9);
        // Zero equity sizes to zero.
        assert_eq!(sized_quantity(&decision, 0.0, 0.02), 0.0);
    }

    #[test]
    fn eligibility_short_circuits_in_order() {
        let decision = decision(0.02);
        assert_eq!(
            context(UserStatus::Suspended).eligibility(&decision),
            Err(SkipReason::Inactive)
        );

        let mut ctx = context(UserStatus::Active);
        ctx.credentials_valid = false;
        ctx.risk_state.lock("locked");
        // Credentials are checked before the risk lock.
        assert_eq!(ctx.eligibility(&decision), Err(SkipReason::InvalidCredentials));

        let mut ctx = context(UserStatus::Active);
        ctx.risk_state.lock("locked");
        assert_eq!(ctx.eligibility(&decision), Err(SkipReason::RiskLocked));

        // Pro tier caps at 3%; a 5% decision is out of reach.
        let ctx = context(UserStatus::Active);
        assert_eq!(
            ctx.eligibility(&self::decision(0.05)),
            Err(SkipReason::SubscriptionCap)
        );

        assert!(context(UserStatus::Active).eligibility(&decision).is_ok());
    }

    #[test]
    fn shutdown_wipes_credentials() {
        let ctx = context(UserStatus::Active);
        assert!(!ctx.credentials_wiped());
        ctx.shutdown();
    }

    #[test]
    fn slippage_is_signed_by_direction() {
        assert!(signed_slippage(Direction::Long, 100.0, 101.0) > 0.0);
        assert!(signed_slippage(Direction::Short, 100.0, 101.0) < 0.0);
    }
}

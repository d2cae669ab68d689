//! End-to-end fan-out behavior: isolation, timeout lockout, cancellation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use verdict_core::{Direction, ExecutionFlag, OrderStatus, TradeRegime, TradingDecision};
use verdict_executor::{
    FanoutSettings, MultiUserExecutor, SubscriptionTier, UserContext, UserCredentials,
    UserProfile, UserRiskState, UserStatus,
};
use verdict_journal::MemoryJournal;
use verdict_test_utils::{MockBehavior, MockExchangeClient};

fn decision() -> TradingDecision {
    TradingDecision {
        id: Uuid::new_v4(),
        symbol: "BTCUSDT".into(),
        direction: Direction::Long,
        confidence: 0.8,
        position_pct: 0.02,
        reference_price: 50_000.0,
        stop_loss_pct: Some(0.015),
        take_profit_pct: Some(0.03),
        regime: TradeRegime::VolatilityExpansion,
        created_at: Utc::now(),
    }
}

fn user(user_id: &str, behavior: MockBehavior) -> UserContext {
    UserContext::new(
        UserProfile {
            user_id: user_id.into(),
            status: UserStatus::Active,
            subscription: SubscriptionTier::Pro,
            leverage: 3.0,
            max_position_pct: 0.02,
        },
        UserCredentials::new(format!("{user_id}-key"), format!("{user_id}-secret")),
        UserRiskState::default(),
        Arc::new(MockExchangeClient::new(behavior)),
        10_000.0,
    )
}

fn executor(settings: FanoutSettings) -> (MultiUserExecutor, Arc<MemoryJournal>) {
    let journal = Arc::new(MemoryJournal::new());
    (MultiUserExecutor::new(settings, journal.clone()), journal)
}

#[tokio::test]
async fn one_failing_user_never_affects_the_others() {
    let (executor, _journal) = executor(FanoutSettings::default());
    executor.add_user(user("user-a", MockBehavior::FillAt(50_010.0))).await;
    executor
        .add_user(user("user-b", MockBehavior::Reject("insufficient margin".into())))
        .await;
    executor.add_user(user("user-c", MockBehavior::FillAt(50_020.0))).await;

    let outcome = executor.broadcast(&decision()).await;

    assert_eq!(outcome.reports["user-a"].status, OrderStatus::Filled);
    assert_eq!(outcome.reports["user-c"].status, OrderStatus::Filled);
    assert_eq!(outcome.reports["user-b"].status, OrderStatus::Rejected);
    assert!(outcome.reports["user-b"]
        .error
        .as_deref()
        .unwrap()
        .contains("insufficient margin"));
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);

    // A second decision still reaches everyone: B's failure left no risk
    // lock behind on A or C, and B itself stays unlocked on rejection.
    let outcome = executor.broadcast(&decision()).await;
    assert_eq!(outcome.reports.len(), 3);
    assert!(outcome.skipped.is_empty());
}

#[tokio::test]
async fn three_consecutive_timeouts_lock_the_user() {
    let settings = FanoutSettings {
        decision_deadline: Duration::from_secs(5),
        order_call_timeout: Duration::from_millis(50),
    };
    let (executor, _journal) = executor(settings);
    executor
        .add_user(user("user-slow", MockBehavior::Stall(Duration::from_secs(10))))
        .await;

    for round in 0..3 {
        let outcome = executor.broadcast(&decision()).await;
        let report = &outcome.reports["user-slow"];
        assert!(report.flags.contains(&ExecutionFlag::Timeout), "round {round}");
    }

    // Locked now: the fourth decision skips the user entirely.
    let outcome = executor.broadcast(&decision()).await;
    assert!(outcome.reports.is_empty());
    assert_eq!(outcome.skipped.len(), 1);
}

#[tokio::test]
async fn decision_deadline_cancels_inflight_work() {
    let settings = FanoutSettings {
        decision_deadline: Duration::from_millis(50),
        // Per-call timeout longer than the decision deadline, so the
        // cancellation path fires first.
        order_call_timeout: Duration::from_secs(30),
    };
    let (executor, journal) = executor(settings);
    executor
        .add_user(user("user-slow", MockBehavior::Stall(Duration::from_secs(60))))
        .await;

    let outcome = executor.broadcast(&decision()).await;
    let report = &outcome.reports["user-slow"];
    assert_eq!(report.status, OrderStatus::Canceled);
    assert!(report.flags.contains(&ExecutionFlag::Canceled));

    // The canceled execution was still journaled.
    let executions = journal.stream("executions");
    assert_eq!(executions.len(), 1);
}

#[tokio::test]
async fn removed_users_have_credentials_wiped_and_are_unreachable() {
    let (executor, _journal) = executor(FanoutSettings::default());
    executor.add_user(user("user-a", MockBehavior::FillAt(50_000.0))).await;
    assert!(executor.remove_user("user-a").await);
    assert!(!executor.remove_user("user-a").await);

    let outcome = executor.broadcast(&decision()).await;
    assert!(outcome.reports.is_empty());
    assert!(outcome.skipped.is_empty());
}

#[tokio::test]
async fn transient_transport_failures_surface_per_user() {
    let (executor, _journal) = executor(FanoutSettings::default());
    executor
        .add_user(user("user-flaky", MockBehavior::FailFirst(1, 50_000.0)))
        .await;

    let first = executor.broadcast(&decision()).await;
    assert_eq!(first.reports["user-flaky"].status, OrderStatus::Rejected);

    // A new decision (new order id) reaches the exchange again and fills.
    let second = executor.broadcast(&decision()).await;
    assert_eq!(second.reports["user-flaky"].status, OrderStatus::Filled);
}

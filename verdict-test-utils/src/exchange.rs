//! A scripted exchange client: each instance is configured with one
//! behavior so tests can model per-user success, rejection, and stalls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use verdict_broker::{BrokerError, BrokerInfo, BrokerResult, ExchangeClient};
use verdict_core::{ExchangeOrderResult, OrderRequest, OrderStatus, Position};

/// How the mock responds to `place_order`.
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Fill immediately at the given price.
    FillAt(f64),
    /// Return an exchange rejection with the given message.
    Reject(String),
    /// Sleep longer than any sane call deadline.
    Stall(Duration),
    /// Fail the first `n` calls with a transport error, then fill.
    FailFirst(usize, f64),
}

/// Scripted [`ExchangeClient`]. Records every request it receives.
pub struct MockExchangeClient {
    behavior: MockBehavior,
    calls: AtomicUsize,
    requests: Mutex<Vec<OrderRequest>>,
}

impl MockExchangeClient {
    #[must_use]
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of `place_order` calls observed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<OrderRequest> {
        self.requests.lock().expect("mock poisoned").clone()
    }

    fn fill(&self, request: &OrderRequest, price: f64) -> ExchangeOrderResult {
        ExchangeOrderResult {
            order_id: request
                .client_order_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            status: OrderStatus::Filled,
            executed_quantity: request.quantity,
            executed_price: price,
            commission: price * request.quantity * 0.0004,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    fn info(&self) -> BrokerInfo {
        BrokerInfo {
            name: "mock".into(),
            markets: vec!["BTCUSDT".into()],
            supports_testnet: true,
        }
    }

    async fn place_order(&self, request: OrderRequest) -> BrokerResult<ExchangeOrderResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("mock poisoned")
            .push(request.clone());
        match &self.behavior {
            MockBehavior::FillAt(price) => Ok(self.fill(&request, *price)),
            MockBehavior::Reject(message) => Err(BrokerError::Exchange(message.clone())),
            MockBehavior::Stall(duration) => {
                tokio::time::sleep(*duration).await;
                Err(BrokerError::Transport("stalled".into()))
            }
            MockBehavior::FailFirst(n, price) => {
                if call < *n {
                    Err(BrokerError::Transport("connection reset".into()))
                } else {
                    Ok(self.fill(&request, *price))
                }
            }
        }
    }

    async fn cancel_order(&self, _order_id: &str, _symbol: &str) -> BrokerResult<bool> {
        Ok(true)
    }

    async fn get_position(&self, symbol: &str) -> BrokerResult<Position> {
        Ok(Position::flat(symbol, Utc::now()))
    }
}

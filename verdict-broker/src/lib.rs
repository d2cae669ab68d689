//! Exchange-agnostic execution contract used by the per-user executor.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use verdict_core::{
    ExchangeOrderResult, OrderId, OrderRequest, OrderStatus, OrderType, Position, Side, Symbol,
};

/// Convenience alias for broker results.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Common error type returned by exchange client implementations.
///
/// Network failures surface as typed variants, never as panics.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Transport-level failures (network, connection resets).
    #[error("transport error: {0}")]
    Transport(String),
    /// Authentication failed or credentials are missing.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// Request parameters invalid for the target exchange.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Exchange responded with a business error (e.g., insufficient margin).
    #[error("exchange error: {0}")]
    Exchange(String),
    /// A catch-all branch for other issues.
    #[error("unexpected error: {0}")]
    Other(String),
}

/// Metadata describing the capabilities of a connector.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BrokerInfo {
    pub name: String,
    pub markets: Vec<String>,
    pub supports_testnet: bool,
}

/// Narrow execution contract the core depends on, one instance per user.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Return metadata about the connector for telemetry.
    fn info(&self) -> BrokerInfo;

    /// Place a new order on the exchange.
    async fn place_order(&self, request: OrderRequest) -> BrokerResult<ExchangeOrderResult>;

    /// Cancel an existing order by identifier. Returns whether it was live.
    async fn cancel_order(&self, order_id: &str, symbol: &str) -> BrokerResult<bool>;

    /// Retrieve the current position for a symbol.
    async fn get_position(&self, symbol: &str) -> BrokerResult<Position>;
}

/// In-memory execution client that fills orders immediately at the last
/// known price. Used by tests and dry runs.
pub struct PaperExchangeClient {
    info: BrokerInfo,
    last_prices: Mutex<HashMap<Symbol, f64>>,
    positions: Mutex<HashMap<Symbol, Position>>,
    open_orders: Mutex<HashMap<OrderId, OrderRequest>>,
    slippage_bps: f64,
    fee_bps: f64,
}

impl Default for PaperExchangeClient {
    fn default() -> Self {
        Self::new("paper".into(), vec!["BTCUSDT".into()], 0.0, 0.0)
    }
}

impl PaperExchangeClient {
    /// Create a new paper client with simulation parameters in basis points.
    #[must_use]
    pub fn new(name: String, markets: Vec<String>, slippage_bps: f64, fee_bps: f64) -> Self {
        Self {
            info: BrokerInfo {
                name,
                markets,
                supports_testnet: true,
            },
            last_prices: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            open_orders: Mutex::new(HashMap::new()),
            slippage_bps,
            fee_bps,
        }
    }

    /// Update the latest market price for a symbol.
    pub fn update_price(&self, symbol: &str, price: f64) {
        let mut prices = self.last_prices.lock().expect("paper client poisoned");
        prices.insert(symbol.to_string(), price);
    }

    fn fill_price(&self, request: &OrderRequest) -> Option<f64> {
        let base = match request.order_type {
            OrderType::Market => {
                let prices = self.last_prices.lock().expect("paper client poisoned");
                prices.get(&request.symbol).copied().or(request.price)
            }
            OrderType::Limit => request.price,
        }?;
        let slippage_rate = self.slippage_bps / 10_000.0;
        let price = match request.side {
            Side::Buy => base * (1.0 + slippage_rate),
            Side::Sell => base * (1.0 - slippage_rate),
        };
        Some(price)
    }

    fn apply_to_position(&self, request: &OrderRequest, fill_price: f64) {
        let mut positions = self.positions.lock().expect("paper client poisoned");
        let entry = positions
            .entry(request.symbol.clone())
            .or_insert_with(|| Position::flat(request.symbol.clone(), Utc::now()));
        match entry.side {
            Some(side) if side == request.side => {
                let total = entry.quantity + request.quantity;
                let prev_cost = entry.entry_price.unwrap_or(fill_price) * entry.quantity;
                entry.entry_price = Some((prev_cost + fill_price * request.quantity) / total);
                entry.quantity = total;
            }
            Some(_) => {
                let remaining = entry.quantity - request.quantity;
                if remaining > 0.0 {
                    entry.quantity = remaining;
                } else if remaining < 0.0 {
                    entry.quantity = remaining.abs();
                    entry.side = Some(request.side);
                    entry.entry_price = Some(fill_price);
                } else {
                    entry.quantity = 0.0;
                    entry.side = None;
                    entry.entry_price = None;
                }
            }
            None => {
                entry.side = Some(request.side);
                entry.quantity = request.quantity;
                entry.entry_price = Some(fill_price);
            }
        }
        entry.updated_at = Utc::now();
    }
}

#[async_trait]
impl ExchangeClient for PaperExchangeClient {
    fn info(&self) -> BrokerInfo {
        self.info.clone()
    }

    async fn place_order(&self, request: OrderRequest) -> BrokerResult<ExchangeOrderResult> {
        if request.quantity <= 0.0 {
            return Err(BrokerError::InvalidRequest(
                "quantity must be positive".into(),
            ));
        }
        let fill_price = self.fill_price(&request).ok_or_else(|| {
            BrokerError::InvalidRequest(format!("no price available for {}", request.symbol))
        })?;
        let commission = fill_price * request.quantity * (self.fee_bps / 10_000.0);
        self.apply_to_position(&request, fill_price);
        let order_id = request
            .client_order_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(order_id = %order_id, symbol = %request.symbol, qty = request.quantity, "paper fill");
        Ok(ExchangeOrderResult {
            order_id,
            status: OrderStatus::Filled,
            executed_quantity: request.quantity,
            executed_price: fill_price,
            commission,
            timestamp: Utc::now(),
        })
    }

    async fn cancel_order(&self, order_id: &str, _symbol: &str) -> BrokerResult<bool> {
        let mut orders = self.open_orders.lock().expect("paper client poisoned");
        Ok(orders.remove(order_id).is_some())
    }

    async fn get_position(&self, symbol: &str) -> BrokerResult<Position> {
        let positions = self.positions.lock().expect("paper client poisoned");
        Ok(positions
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Position::flat(symbol, Utc::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market_order(qty: f64) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: qty,
            price: None,
            client_order_id: Some("ord-1".into()),
        }
    }

    #[tokio::test]
    async fn paper_client_fills_at_last_price_with_slippage() {
        let client = PaperExchangeClient::new("paper".into(), vec!["BTCUSDT".into()], 10.0, 5.0);
        client.update_price("BTCUSDT", 50_000.0);

        let result = client.place_order(market_order(0.5)).await.unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.order_id, "ord-1");
        assert!((result.executed_price - 50_050.0).abs() < 1e-6);
        assert!(result.commission > 0.0);

        let position = client.get_position("BTCUSDT").await.unwrap();
        assert_eq!(position.side, Some(Side::Buy));
        assert!((position.quantity - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn paper_client_rejects_unpriced_market_orders() {
        let client = PaperExchangeClient::default();
        let err = client.place_order(market_order(1.0)).await.unwrap_err();
        assert!(matches!(err, BrokerError::InvalidRequest(_)));
    }
}

pub mod indodax;

pub use indodax::IndodaxClient;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::Candle;
use crate::Result;

/// Source of candles and last-trade prices
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// The latest `limit` candles of `interval_secs`, ascending by timestamp
    async fn fetch_candles(
        &self,
        pair: &str,
        interval_secs: u64,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    async fn fetch_last_price(&self, pair: &str) -> Result<f64>;
}

/// Order submission and account balance
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a limit order; `Ok` only on an explicit exchange acknowledgement
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck>;

    async fn query_balance(&self) -> Result<BalanceSnapshot>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// A limit order for `amount` units of the pair's base currency
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub pair: String,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
}

/// Available funds per currency, keyed by lowercase currency code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceSnapshot {
    pub balances: HashMap<String, f64>,
}

impl BalanceSnapshot {
    pub fn available(&self, currency: &str) -> Option<f64> {
        self.balances.get(&currency.to_lowercase()).copied()
    }
}

/// Split `btc_idr` into (`btc`, `idr`)
pub fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (base, quote) = pair.split_once('_')?;
    if base.is_empty() || quote.is_empty() || quote.contains('_') {
        return None;
    }
    Some((base, quote))
}

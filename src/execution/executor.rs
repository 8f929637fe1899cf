use std::sync::Arc;

use crate::api::{split_pair, OrderGateway, OrderRequest, OrderSide};
use crate::config::TradingMode;
use crate::execution::TradeIntent;
use crate::logging::TRADE_TARGET;
use crate::models::TradeAction;
use crate::Result;

/// A committed fill
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub action: TradeAction,
    pub price: f64,
    pub amount: f64,
    pub total: f64,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Filled(Fill),
    Skipped { reason: String },
}

impl ExecutionOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        ExecutionOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn fill(&self) -> Option<&Fill> {
        match self {
            ExecutionOutcome::Filled(fill) => Some(fill),
            ExecutionOutcome::Skipped { .. } => None,
        }
    }
}

/// Turns trade intents into balance changes, simulated or on the exchange
pub struct Executor {
    mode: TradingMode,
    gateway: Option<Arc<dyn OrderGateway>>,
}

impl Executor {
    /// Zero-cost, full-fill simulation against the decision price
    pub fn paper() -> Self {
        Self {
            mode: TradingMode::Paper,
            gateway: None,
        }
    }

    pub fn live(gateway: Arc<dyn OrderGateway>) -> Self {
        Self {
            mode: TradingMode::Live,
            gateway: Some(gateway),
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    /// Execute `intent` for `pair` at `price`, updating `balance` on a fill
    ///
    /// # Returns
    /// * `Filled` when the trade committed
    /// * `Skipped` for HOLD, zero amounts and unaffordable paper buys
    /// * `Err(OrderExecution)` when a live order is rejected or ambiguous; `balance`
    ///   is untouched in that case
    pub async fn execute(
        &self,
        pair: &str,
        intent: &TradeIntent,
        price: f64,
        balance: &mut f64,
    ) -> Result<ExecutionOutcome> {
        let side = match intent.action {
            TradeAction::Buy => OrderSide::Buy,
            TradeAction::Sell => OrderSide::Sell,
            TradeAction::Hold => return Ok(ExecutionOutcome::skipped("Hold")),
        };
        if intent.amount <= 0.0 {
            return Ok(ExecutionOutcome::skipped("Zero amount"));
        }

        match &self.gateway {
            None => Ok(self.execute_paper(pair, intent, price, balance)),
            Some(gateway) => {
                self.execute_live(gateway.as_ref(), pair, side, intent, price, balance)
                    .await
            }
        }
    }

    fn execute_paper(
        &self,
        pair: &str,
        intent: &TradeIntent,
        price: f64,
        balance: &mut f64,
    ) -> ExecutionOutcome {
        let total = price * intent.amount;

        match intent.action {
            TradeAction::Buy => {
                if total > *balance {
                    tracing::debug!(
                        "Paper BUY skipped: cost {:.2} exceeds balance {:.2}",
                        total,
                        balance
                    );
                    return ExecutionOutcome::skipped("Insufficient paper balance");
                }
                *balance -= total;
            }
            // Inventory is tracked by the position, so sells always commit
            TradeAction::Sell => *balance += total,
            TradeAction::Hold => return ExecutionOutcome::skipped("Hold"),
        }

        tracing::info!(
            target: TRADE_TARGET,
            "[PAPER] {} {:.8} {} @ {:.2}",
            intent.action,
            intent.amount,
            pair,
            price
        );

        ExecutionOutcome::Filled(Fill {
            action: intent.action,
            price,
            amount: intent.amount,
            total,
            order_id: None,
        })
    }

    async fn execute_live(
        &self,
        gateway: &dyn OrderGateway,
        pair: &str,
        side: OrderSide,
        intent: &TradeIntent,
        price: f64,
        balance: &mut f64,
    ) -> Result<ExecutionOutcome> {
        let order = OrderRequest {
            pair: pair.to_string(),
            side,
            price,
            amount: intent.amount,
        };

        // Rejected or ambiguous responses propagate before any state changes
        let ack = gateway.submit_order(&order).await?;

        tracing::info!(
            target: TRADE_TARGET,
            "[LIVE] {} {:.8} {} @ {:.2} (order {})",
            intent.action,
            intent.amount,
            pair,
            price,
            ack.order_id
        );

        self.refresh_balance(gateway, pair, balance).await;

        Ok(ExecutionOutcome::Filled(Fill {
            action: intent.action,
            price,
            amount: intent.amount,
            total: price * intent.amount,
            order_id: Some(ack.order_id),
        }))
    }

    /// Replace `balance` with the exchange's quote-currency balance
    ///
    /// The order is already acknowledged, so a failed query only leaves the
    /// previous balance in place.
    async fn refresh_balance(&self, gateway: &dyn OrderGateway, pair: &str, balance: &mut f64) {
        let Some((_, quote)) = split_pair(pair) else {
            tracing::warn!("Cannot derive quote currency from pair {}", pair);
            return;
        };

        match gateway.query_balance().await {
            Ok(snapshot) => match snapshot.available(quote) {
                Some(available) => *balance = available,
                None => tracing::warn!("Balance response has no {} entry", quote),
            },
            Err(e) => tracing::error!("Balance refresh failed after fill: {}", e),
        }
    }
}

use chrono::{DateTime, Utc};

use crate::config::RiskConfig;
use crate::models::{Signal, TradeAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SignalExit, // Aggregated SELL signal while LONG
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop-loss",
            ExitReason::TakeProfit => "take-profit",
            ExitReason::SignalExit => "sell signal",
        }
    }
}

/// An open long position
///
/// `size` is fixed at entry and read back unchanged by every exit.
#[derive(Debug, Clone, PartialEq)]
pub struct LongPosition {
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: f64,   // entry * (1 - stop_loss fraction), or entry - ATR * multiplier
    pub take_profit: f64, // entry * (1 + take_profit fraction)
    pub entry_time: DateTime<Utc>,
}

impl LongPosition {
    pub fn pnl_at(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.size
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Position {
    #[default]
    Flat,
    Long(LongPosition),
}

impl Position {
    pub fn is_long(&self) -> bool {
        matches!(self, Position::Long(_))
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            Position::Flat => "FLAT",
            Position::Long(_) => "LONG",
        }
    }
}

/// What the position manager wants executed this tick
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub action: TradeAction,
    pub amount: f64,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: Option<f64>,
}

impl TradeIntent {
    pub fn hold() -> Self {
        Self {
            action: TradeAction::Hold,
            amount: 0.0,
            exit_reason: None,
            realized_pnl: None,
        }
    }

    fn entry(size: f64) -> Self {
        Self {
            action: TradeAction::Buy,
            amount: size,
            exit_reason: None,
            realized_pnl: None,
        }
    }

    fn exit(position: &LongPosition, price: f64, reason: ExitReason) -> Self {
        Self {
            action: TradeAction::Sell,
            amount: position.size,
            exit_reason: Some(reason),
            realized_pnl: Some(position.pnl_at(price)),
        }
    }

    pub fn is_trade(&self) -> bool {
        self.action != TradeAction::Hold && self.amount > 0.0
    }
}

/// FLAT/LONG state machine for a single pair
#[derive(Debug, Clone)]
pub struct PositionManager {
    position: Position,
    max_position_size: f64,
    stop_loss_pct: f64,
    take_profit_pct: f64,
    atr_stop_multiplier: Option<f64>,
    atr: Option<f64>,
}

impl PositionManager {
    pub fn new(risk: &RiskConfig) -> Self {
        Self {
            position: Position::Flat,
            max_position_size: risk.max_position_size,
            stop_loss_pct: risk.stop_loss,
            take_profit_pct: risk.take_profit,
            atr_stop_multiplier: risk.atr_stop_multiplier,
            atr: None,
        }
    }

    /// Create PositionManager already holding `position`
    pub fn with_position(risk: &RiskConfig, position: Position) -> Self {
        Self {
            position,
            ..Self::new(risk)
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Latest ATR reading, used for the stop of the next entry when an ATR
    /// multiplier is configured
    pub fn set_atr(&mut self, atr: Option<f64>) {
        self.atr = atr;
    }

    /// Stop price for an entry at `price`
    ///
    /// Falls back to the fixed fraction without a usable ATR or when the ATR
    /// distance would put the stop at or below zero.
    fn entry_stop(&self, price: f64) -> f64 {
        let fixed = price * (1.0 - self.stop_loss_pct);
        match (self.atr_stop_multiplier, self.atr) {
            (Some(multiplier), Some(atr)) if atr.is_finite() && atr > 0.0 => {
                let stop = price - atr * multiplier;
                if stop > 0.0 {
                    stop
                } else {
                    fixed
                }
            }
            _ => fixed,
        }
    }

    /// Put back a position captured before `decide`, undoing a decision that
    /// could not be executed
    pub fn restore(&mut self, position: Position) {
        if self.position != position {
            tracing::debug!(
                "Restoring position {} -> {}",
                self.position.state_name(),
                position.state_name()
            );
        }
        self.position = position;
    }

    /// Decide this tick's trade (live trading - uses current time)
    pub fn decide(&mut self, signal: Signal, price: f64, balance: f64) -> TradeIntent {
        self.decide_at(signal, price, balance, None)
    }

    /// Decide with explicit timestamp for the entry time
    ///
    /// While LONG, exits are checked in order stop-loss, take-profit, SELL signal;
    /// the first match closes the full recorded size. A BUY while LONG is HOLD.
    pub fn decide_at(
        &mut self,
        signal: Signal,
        price: f64,
        balance: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> TradeIntent {
        if !price.is_finite() || price <= 0.0 {
            tracing::warn!("Ignoring invalid price {} for position decision", price);
            return TradeIntent::hold();
        }

        match &self.position {
            Position::Long(long) => {
                let reason = if price <= long.stop_loss {
                    Some(ExitReason::StopLoss)
                } else if price >= long.take_profit {
                    Some(ExitReason::TakeProfit)
                } else if signal == Signal::Sell {
                    Some(ExitReason::SignalExit)
                } else {
                    None
                };

                let Some(reason) = reason else {
                    return TradeIntent::hold();
                };

                let intent = TradeIntent::exit(long, price, reason);
                tracing::info!(
                    "Closing LONG {:.8} @ {:.2} ({}, entry {:.2}, P&L {:.2})",
                    long.size,
                    price,
                    reason.as_str(),
                    long.entry_price,
                    intent.realized_pnl.unwrap_or(0.0)
                );
                self.position = Position::Flat;
                intent
            }

            Position::Flat => {
                if signal != Signal::Buy {
                    return TradeIntent::hold();
                }

                let size = balance * self.max_position_size / price;
                if !size.is_finite() || size <= 0.0 {
                    tracing::warn!(
                        "BUY signal ignored: balance {:.2} gives no position size",
                        balance
                    );
                    return TradeIntent::hold();
                }

                let long = LongPosition {
                    entry_price: price,
                    size,
                    stop_loss: self.entry_stop(price),
                    take_profit: price * (1.0 + self.take_profit_pct),
                    entry_time: timestamp.unwrap_or_else(Utc::now),
                };
                tracing::info!(
                    "Opening LONG {:.8} @ {:.2} (SL {:.2}, TP {:.2})",
                    long.size,
                    long.entry_price,
                    long.stop_loss,
                    long.take_profit
                );
                self.position = Position::Long(long);
                TradeIntent::entry(size)
            }
        }
    }
}

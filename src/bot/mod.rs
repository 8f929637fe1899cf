pub mod report;
pub mod schedule;
pub mod shutdown;

pub use report::StatusReport;
pub use shutdown::Shutdown;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::api::{split_pair, MarketDataFeed, OrderGateway};
use crate::config::{BotConfig, TradingMode};
use crate::db::TradeStore;
use crate::execution::{
    ExecutionOutcome, Executor, Fill, Position, PositionManager, TradeIntent,
};
use crate::indicators::{IndicatorEngine, IndicatorSnapshot};
use crate::logging::SIGNAL_TARGET;
use crate::models::{Candle, MarketSnapshotRecord, Signal, TradeAction, TradeRecord};
use crate::risk::{CircuitBreakers, TradingState};
use crate::strategy::{validate_candle_order, SignalAggregator, VoteBreakdown};
use crate::{BotError, Result};

/// Run state carried from one tick to the next
///
/// Owned by the run loop and only mutated inside `run_tick`.
#[derive(Debug, Clone)]
pub struct BotContext {
    pub balance: f64,
    pub position_manager: PositionManager,
    pub trading_state: TradingState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Every stage ran; carries the status to print
    Completed(StatusReport),
    /// A fetch failed; nothing was mutated
    Aborted { reason: String },
}

/// Fetch, indicate, aggregate, decide, execute, persist and report, once per candle
pub struct TradingBot {
    config: BotConfig,
    engine: IndicatorEngine,
    aggregator: SignalAggregator,
    breakers: CircuitBreakers,
    feed: Arc<dyn MarketDataFeed>,
    executor: Executor,
    store: Arc<dyn TradeStore>,
    shutdown: Arc<Shutdown>,
}

impl TradingBot {
    /// The gateway is only used in live mode
    pub fn new(
        config: BotConfig,
        feed: Arc<dyn MarketDataFeed>,
        gateway: Arc<dyn OrderGateway>,
        store: Arc<dyn TradeStore>,
    ) -> Self {
        let engine = IndicatorEngine::new(config.indicators.clone());
        let aggregator = SignalAggregator::new(engine.min_warmup());
        let breakers = CircuitBreakers::new(config.risk.max_daily_loss);
        let executor = match config.mode {
            TradingMode::Paper => Executor::paper(),
            TradingMode::Live => Executor::live(gateway),
        };

        Self {
            config,
            engine,
            aggregator,
            breakers,
            feed,
            executor,
            store,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// FLAT with the configured starting balance
    pub fn initial_context(&self) -> BotContext {
        BotContext {
            balance: self.config.initial_balance,
            position_manager: PositionManager::new(&self.config.risk),
            trading_state: TradingState::new(self.config.initial_balance, Utc::now()),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    /// Run ticks until a shutdown is requested
    ///
    /// Errors never end the loop: an aborted tick waits for the next candle, any
    /// other failure waits `error_backoff_secs` and tries again.
    pub async fn run(&self, ctx: &mut BotContext) {
        let interval = self.config.timeframe.seconds();
        tracing::info!(
            "Starting {} trading on {} ({} candles, balance {:.2})",
            self.executor.mode(),
            self.config.pair,
            self.config.timeframe,
            ctx.balance
        );

        while !self.shutdown.is_requested() {
            let wait = match self.run_tick(ctx).await {
                Ok(TickOutcome::Completed(report)) => {
                    println!("{}", report);
                    schedule::time_until_next_boundary(Utc::now(), interval)
                }
                Ok(TickOutcome::Aborted { reason }) => {
                    tracing::warn!("Tick aborted: {}", reason);
                    schedule::time_until_next_boundary(Utc::now(), interval)
                }
                Err(e) => {
                    tracing::error!(
                        "Tick failed: {} (retrying in {}s)",
                        e,
                        self.config.error_backoff_secs
                    );
                    Duration::from_secs(self.config.error_backoff_secs)
                }
            };

            if self.shutdown.sleep(wait).await {
                break;
            }
        }

        tracing::info!(
            "Trading stopped: {} balance {:.2}, position {}",
            self.config.pair,
            ctx.balance,
            ctx.position_manager.position().state_name()
        );
    }

    /// Run one tick (live trading - uses current time)
    pub async fn run_tick(&self, ctx: &mut BotContext) -> Result<TickOutcome> {
        self.run_tick_at(ctx, Utc::now()).await
    }

    /// Run one tick with an explicit clock for day rollover and entry times
    ///
    /// # Returns
    /// * `Completed` with the status report when the tick ran through
    /// * `Aborted` when candles or the price could not be fetched
    /// * `Err` for anything that is not a data, order or storage failure
    pub async fn run_tick_at(
        &self,
        ctx: &mut BotContext,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome> {
        let pair = self.config.pair.as_str();
        ctx.trading_state.roll_day(now, ctx.balance);

        // Fetch
        let candles = match self.fetch_candles().await {
            Ok(candles) => candles,
            Err(e) if e.is_data_fetch() => return Ok(abort("candle fetch", e)),
            Err(e) => return Err(e),
        };
        let Some(latest_candle) = candles.last().copied() else {
            tracing::error!("Candle fetch returned no data for {}", pair);
            return Ok(TickOutcome::Aborted {
                reason: format!("no candles for {}", pair),
            });
        };

        // Indicate + aggregate
        let snapshots = self.engine.compute(&candles);
        let latest = snapshots.last().cloned().unwrap_or_else(|| {
            IndicatorSnapshot::empty(latest_candle.timestamp, latest_candle.close)
        });

        let votes = match self.aggregator.evaluate(&snapshots) {
            Ok(votes) => Some(votes),
            Err(BotError::InsufficientData(msg)) => {
                tracing::warn!("Holding on {}: {}", pair, msg);
                None
            }
            Err(e) => return Err(e),
        };
        let signal = votes.as_ref().map_or(Signal::Hold, VoteBreakdown::signal);
        log_signal(pair, signal, votes.as_ref(), &latest);

        let mut price = latest_candle.close;
        let mut fill = None;

        if votes.is_some() {
            // Price
            price = match self.feed.fetch_last_price(pair).await {
                Ok(price) => price,
                Err(e) if e.is_data_fetch() => return Ok(abort("price fetch", e)),
                Err(e) => return Err(e),
            };

            // Decide
            let gated = gate_entry(&self.breakers, signal, &ctx.trading_state);
            let before = ctx.position_manager.position().clone();
            ctx.position_manager.set_atr(latest.atr);
            let intent = ctx
                .position_manager
                .decide_at(gated, price, ctx.balance, Some(now));

            // Execute
            if intent.is_trade() {
                fill = self.execute(ctx, &intent, price, before).await?;
                if fill.is_some() {
                    ctx.trading_state.record_trade(intent.realized_pnl);
                }
            }

            // Persist trade
            if let Some(fill) = &fill {
                self.persist_trade(now, fill, signal, &intent, ctx.balance)
                    .await;
            }
        }

        // Persist market data
        self.persist_snapshot(&latest_candle, &latest).await;

        // Report
        let report = StatusReport {
            time: now,
            pair: pair.to_string(),
            quote: split_pair(pair)
                .map(|(_, quote)| quote.to_uppercase())
                .unwrap_or_default(),
            mode: self.executor.mode(),
            price,
            signal,
            action: fill.as_ref().map_or(TradeAction::Hold, |f| f.action),
            position: ctx.position_manager.position().state_name(),
            balance: ctx.balance,
            rsi: latest.rsi,
            macd: latest.macd,
        };
        tracing::info!("{}", report.summary());

        Ok(TickOutcome::Completed(report))
    }

    async fn fetch_candles(&self) -> Result<Vec<Candle>> {
        let candles = self
            .feed
            .fetch_candles(
                &self.config.pair,
                self.config.timeframe.seconds(),
                self.config.candle_limit,
            )
            .await?;
        validate_candle_order(&candles)?;
        Ok(candles)
    }

    /// Execute `intent`, putting back `before` when nothing was committed
    async fn execute(
        &self,
        ctx: &mut BotContext,
        intent: &TradeIntent,
        price: f64,
        before: Position,
    ) -> Result<Option<Fill>> {
        let result = self
            .executor
            .execute(&self.config.pair, intent, price, &mut ctx.balance)
            .await;

        match result {
            Ok(ExecutionOutcome::Filled(fill)) => Ok(Some(fill)),
            Ok(ExecutionOutcome::Skipped { reason }) => {
                tracing::info!("{} not executed: {}", intent.action, reason);
                ctx.position_manager.restore(before);
                Ok(None)
            }
            Err(e @ BotError::OrderExecution(_)) => {
                tracing::error!(
                    "{} order failed, position unchanged: {}",
                    intent.action,
                    e
                );
                ctx.position_manager.restore(before);
                Ok(None)
            }
            Err(e) => {
                ctx.position_manager.restore(before);
                Err(e)
            }
        }
    }

    async fn persist_trade(
        &self,
        now: DateTime<Utc>,
        fill: &Fill,
        signal: Signal,
        intent: &TradeIntent,
        balance: f64,
    ) {
        let record = TradeRecord {
            id: None,
            timestamp: now,
            pair: self.config.pair.clone(),
            action: fill.action,
            price: fill.price,
            amount: fill.amount,
            total: fill.total,
            signal,
            profit_loss: intent.realized_pnl,
            balance,
        };

        if let Err(e) = self.store.append_trade(&record).await {
            tracing::error!("Failed to save {} trade: {}", record.action, e);
        }
    }

    async fn persist_snapshot(&self, candle: &Candle, indicators: &IndicatorSnapshot) {
        let record = MarketSnapshotRecord {
            timestamp: candle.timestamp,
            pair: self.config.pair.clone(),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            rsi: indicators.rsi,
            macd: indicators.macd,
            ma_fast: indicators.ma_fast,
            ma_slow: indicators.ma_slow,
        };

        if let Err(e) = self.store.upsert_market_snapshot(&record).await {
            tracing::error!("Failed to save market data: {}", e);
        }
    }
}

/// Downgrade BUY to HOLD while the daily-loss breaker is tripped; exits pass
fn gate_entry(breakers: &CircuitBreakers, signal: Signal, state: &TradingState) -> Signal {
    if signal != Signal::Buy {
        return signal;
    }

    match breakers.check(state) {
        Ok(()) => signal,
        Err(trip) => {
            tracing::warn!(
                "Circuit breaker {:?}: BUY suppressed (daily P&L {:.2} of {:.2})",
                trip,
                state.daily_pnl,
                state.day_start_balance
            );
            Signal::Hold
        }
    }
}

fn abort(stage: &str, error: BotError) -> TickOutcome {
    tracing::error!("{} failed: {}", stage, error);
    TickOutcome::Aborted {
        reason: format!("{}: {}", stage, error),
    }
}

fn log_signal(
    pair: &str,
    signal: Signal,
    votes: Option<&VoteBreakdown>,
    latest: &IndicatorSnapshot,
) {
    match votes {
        Some(v) => tracing::info!(
            target: SIGNAL_TARGET,
            "{} {} (buy {} / sell {}; rsi {} macd {} ma {} bb {} stoch {}) RSI={:?} MACD={:?}",
            pair,
            signal,
            v.buy_votes(),
            v.sell_votes(),
            v.rsi,
            v.macd,
            v.ma_cross,
            v.bollinger,
            v.stochastic,
            latest.rsi,
            latest.macd
        ),
        None => tracing::info!(target: SIGNAL_TARGET, "{} {} (warming up)", pair, signal),
    }
}

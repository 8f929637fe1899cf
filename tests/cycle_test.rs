use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use scalper::api::{BalanceSnapshot, MarketDataFeed, OrderAck, OrderGateway, OrderRequest};
use scalper::bot::{BotContext, TickOutcome, TradingBot};
use scalper::config::{BotConfig, Credentials, Settings};
use scalper::db::TradeStore;
use scalper::execution::{LongPosition, Position, PositionManager};
use scalper::{
    BotError, Candle, ExchangeError, MarketSnapshotRecord, Result, TradeAction, TradeRecord,
};

// ============================================================================
// Fakes
// ============================================================================

struct FakeFeed {
    candles: Vec<Candle>,
    price: f64,
    candle_failures: Mutex<usize>,
    unexpected: bool,
    price_fails: bool,
    candle_calls: AtomicUsize,
    price_calls: AtomicUsize,
}

impl FakeFeed {
    fn new(candles: Vec<Candle>, price: f64) -> Self {
        Self {
            candles,
            price,
            candle_failures: Mutex::new(0),
            unexpected: false,
            price_fails: false,
            candle_calls: AtomicUsize::new(0),
            price_calls: AtomicUsize::new(0),
        }
    }

    fn failing_first(self, failures: usize) -> Self {
        *self.candle_failures.lock().unwrap() = failures;
        self
    }
}

#[async_trait]
impl MarketDataFeed for FakeFeed {
    async fn fetch_candles(
        &self,
        _pair: &str,
        _interval_secs: u64,
        _limit: usize,
    ) -> Result<Vec<Candle>> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        if self.unexpected {
            return Err(BotError::Unexpected("feed state corrupted".to_string()));
        }

        let mut failures = self.candle_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(BotError::DataFetch(ExchangeError::Payload(
                "connection reset".to_string(),
            )));
        }

        Ok(self.candles.clone())
    }

    async fn fetch_last_price(&self, _pair: &str) -> Result<f64> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if self.price_fails {
            return Err(BotError::DataFetch(ExchangeError::Payload(
                "ticker unavailable".to_string(),
            )));
        }
        Ok(self.price)
    }
}

struct FakeGateway {
    reject: bool,
    idr_balance: f64,
    orders: Mutex<Vec<OrderRequest>>,
}

impl FakeGateway {
    fn new(reject: bool, idr_balance: f64) -> Self {
        Self {
            reject,
            idr_balance,
            orders: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OrderGateway for FakeGateway {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        self.orders.lock().unwrap().push(order.clone());
        if self.reject {
            return Err(BotError::OrderExecution(ExchangeError::Rejected(
                "Insufficient balance".to_string(),
            )));
        }
        Ok(OrderAck {
            order_id: "9001".to_string(),
        })
    }

    async fn query_balance(&self) -> Result<BalanceSnapshot> {
        let mut balances = HashMap::new();
        balances.insert("idr".to_string(), self.idr_balance);
        Ok(BalanceSnapshot { balances })
    }
}

#[derive(Default)]
struct MemoryStore {
    fail: bool,
    trades: Mutex<Vec<TradeRecord>>,
    snapshots: Mutex<Vec<MarketSnapshotRecord>>,
}

impl MemoryStore {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn append_trade(&self, trade: &TradeRecord) -> Result<i64> {
        if self.fail {
            return Err(BotError::Persistence(sqlx::Error::PoolClosed));
        }
        let mut trades = self.trades.lock().unwrap();
        trades.push(trade.clone());
        Ok(trades.len() as i64)
    }

    async fn upsert_market_snapshot(&self, snapshot: &MarketSnapshotRecord) -> Result<()> {
        if self.fail {
            return Err(BotError::Persistence(sqlx::Error::PoolClosed));
        }
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn read_trade_history(&self, limit: usize) -> Result<Vec<TradeRecord>> {
        let trades = self.trades.lock().unwrap();
        Ok(trades.iter().rev().take(limit).cloned().collect())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Oscillating closes 100..103 with a real high/low range on every bar
fn candles(count: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let close = 100.0 + (i % 4) as f64;
            Candle {
                timestamp: start + Duration::minutes(5 * i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

/// Quiet market followed by a sharp sell-off on the last candle
///
/// The final candle votes BUY on RSI (drops through 30), Bollinger (close under
/// the lower band) and stochastic (%K and %D under 20), with no SELL votes.
fn selloff_candles() -> Vec<Candle> {
    let mut data = candles(96);
    let start = data[95].timestamp;
    for (i, close) in [100.0, 98.0, 96.0, 80.0].into_iter().enumerate() {
        data.push(Candle {
            timestamp: start + Duration::minutes(5 * (i as i64 + 1)),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        });
    }
    data
}

fn config(live: bool) -> BotConfig {
    config_with(Settings {
        paper_trading: !live,
        ..Settings::default()
    })
}

fn config_with(settings: Settings) -> BotConfig {
    let live = !settings.paper_trading;
    let credentials = live.then(|| Credentials {
        api_key: "key".to_string(),
        secret_key: "secret".to_string(),
    });
    BotConfig::from_settings(settings, credentials).unwrap()
}

fn bot(
    live: bool,
    feed: Arc<FakeFeed>,
    gateway: Arc<FakeGateway>,
    store: Arc<MemoryStore>,
) -> TradingBot {
    TradingBot::new(config(live), feed, gateway, store)
}

/// Context already LONG 0.5 units from `entry`
fn long_context(bot: &TradingBot, entry: f64) -> BotContext {
    let mut ctx = bot.initial_context();
    let long = LongPosition {
        entry_price: entry,
        size: 0.5,
        stop_loss: entry * 0.98,
        take_profit: entry * 1.015,
        entry_time: Utc::now(),
    };
    ctx.position_manager = PositionManager::with_position(&bot.config().risk, Position::Long(long));
    ctx
}

fn completed(outcome: TickOutcome) -> scalper::bot::StatusReport {
    match outcome {
        TickOutcome::Completed(report) => report,
        TickOutcome::Aborted { reason } => panic!("tick aborted: {}", reason),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_fetch_failure_is_contained() {
    let feed = Arc::new(FakeFeed::new(candles(100), 100.0).failing_first(1));
    let store = Arc::new(MemoryStore::default());
    let bot = bot(false, feed.clone(), Arc::new(FakeGateway::new(false, 0.0)), store.clone());
    let mut ctx = long_context(&bot, 101.0);
    let position_before = ctx.position_manager.position().clone();

    let outcome = bot.run_tick(&mut ctx).await.unwrap();

    assert!(matches!(outcome, TickOutcome::Aborted { .. }));
    assert_eq!(ctx.balance, 1_000_000.0);
    assert_eq!(ctx.position_manager.position(), &position_before);
    assert_eq!(feed.price_calls.load(Ordering::SeqCst), 0);
    assert!(store.snapshots.lock().unwrap().is_empty());

    // Next tick proceeds normally
    let report = completed(bot.run_tick(&mut ctx).await.unwrap());
    assert_eq!(report.pair, "btc_idr");
    assert_eq!(feed.candle_calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.snapshots.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_short_window_holds_and_still_persists_market_data() {
    let feed = Arc::new(FakeFeed::new(candles(20), 100.0));
    let store = Arc::new(MemoryStore::default());
    let bot = bot(false, feed.clone(), Arc::new(FakeGateway::new(false, 0.0)), store.clone());
    let mut ctx = long_context(&bot, 150.0);

    let report = completed(bot.run_tick(&mut ctx).await.unwrap());

    assert_eq!(report.signal, scalper::Signal::Hold);
    assert_eq!(report.action, TradeAction::Hold);
    // No price fetch and no decision while warming up, even though the stop is hit
    assert_eq!(feed.price_calls.load(Ordering::SeqCst), 0);
    assert!(ctx.position_manager.position().is_long());
    assert!(store.trades.lock().unwrap().is_empty());

    let snapshots = store.snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].timestamp, candles(20)[19].timestamp);
    assert!(snapshots[0].rsi.is_some());
    // MA_21 is still undefined and must be stored as missing, not zero
    assert_eq!(snapshots[0].ma_slow, None);
}

#[tokio::test]
async fn test_paper_stop_loss_closes_and_records_trade() {
    let feed = Arc::new(FakeFeed::new(candles(100), 100.0));
    let store = Arc::new(MemoryStore::default());
    let bot = bot(false, feed.clone(), Arc::new(FakeGateway::new(false, 0.0)), store.clone());
    let mut ctx = long_context(&bot, 110.0);

    let report = completed(bot.run_tick(&mut ctx).await.unwrap());

    assert_eq!(report.action, TradeAction::Sell);
    assert_eq!(report.position, "FLAT");
    assert_eq!(feed.price_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.balance, 1_000_050.0);
    assert_eq!(ctx.trading_state.daily_trades, 1);
    assert_eq!(ctx.trading_state.daily_pnl, -5.0);

    let trades = store.trades.lock().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].action, TradeAction::Sell);
    assert_eq!(trades[0].price, 100.0);
    assert_eq!(trades[0].amount, 0.5);
    assert_eq!(trades[0].total, 50.0);
    assert_eq!(trades[0].profit_loss, Some(-5.0));
    assert_eq!(trades[0].balance, 1_000_050.0);
}

#[tokio::test]
async fn test_live_rejection_leaves_state_unchanged() {
    let feed = Arc::new(FakeFeed::new(candles(100), 100.0));
    let gateway = Arc::new(FakeGateway::new(true, 0.0));
    let store = Arc::new(MemoryStore::default());
    let bot = bot(true, feed, gateway.clone(), store.clone());
    let mut ctx = long_context(&bot, 110.0);
    let position_before = ctx.position_manager.position().clone();

    let report = completed(bot.run_tick(&mut ctx).await.unwrap());

    assert_eq!(gateway.orders.lock().unwrap().len(), 1);
    assert_eq!(report.action, TradeAction::Hold);
    assert_eq!(ctx.position_manager.position(), &position_before);
    assert_eq!(ctx.balance, 1_000_000.0);
    assert_eq!(ctx.trading_state.daily_trades, 0);
    assert!(store.trades.lock().unwrap().is_empty());
    // Market data is still recorded
    assert_eq!(store.snapshots.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_live_take_profit_refreshes_balance_from_exchange() {
    let feed = Arc::new(FakeFeed::new(candles(100), 102.0));
    let gateway = Arc::new(FakeGateway::new(false, 1_234_567.0));
    let store = Arc::new(MemoryStore::default());
    let bot = bot(true, feed, gateway.clone(), store.clone());
    let mut ctx = long_context(&bot, 100.0);

    let report = completed(bot.run_tick(&mut ctx).await.unwrap());

    assert_eq!(report.action, TradeAction::Sell);
    assert_eq!(ctx.balance, 1_234_567.0);
    assert!(!ctx.position_manager.position().is_long());

    let orders = gateway.orders.lock().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].amount, 0.5);

    let trades = store.trades.lock().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].balance, 1_234_567.0);
    assert_eq!(trades[0].profit_loss, Some(1.0));
}

#[tokio::test]
async fn test_unexpected_error_escapes_tick() {
    let mut feed = FakeFeed::new(candles(100), 100.0);
    feed.unexpected = true;
    let feed = Arc::new(feed);
    let bot = bot(
        false,
        feed,
        Arc::new(FakeGateway::new(false, 0.0)),
        Arc::new(MemoryStore::default()),
    );
    let mut ctx = bot.initial_context();

    let result = bot.run_tick(&mut ctx).await;

    assert!(matches!(result, Err(BotError::Unexpected(_))));
    assert_eq!(ctx.balance, 1_000_000.0);
    assert!(!ctx.position_manager.position().is_long());
}

#[tokio::test]
async fn test_store_failure_does_not_abort_tick() {
    let feed = Arc::new(FakeFeed::new(candles(100), 100.0));
    let store = Arc::new(MemoryStore::failing());
    let bot = bot(false, feed, Arc::new(FakeGateway::new(false, 0.0)), store);
    let mut ctx = long_context(&bot, 110.0);

    let report = completed(bot.run_tick(&mut ctx).await.unwrap());

    assert_eq!(report.action, TradeAction::Sell);
    assert_eq!(ctx.balance, 1_000_050.0);
    assert!(!ctx.position_manager.position().is_long());
}

#[tokio::test]
async fn test_unsorted_candles_abort_tick() {
    let mut data = candles(100);
    data.swap(10, 11);
    let feed = Arc::new(FakeFeed::new(data, 100.0));
    let store = Arc::new(MemoryStore::default());
    let bot = bot(false, feed.clone(), Arc::new(FakeGateway::new(false, 0.0)), store.clone());
    let mut ctx = long_context(&bot, 110.0);

    let outcome = bot.run_tick(&mut ctx).await.unwrap();

    assert!(matches!(outcome, TickOutcome::Aborted { .. }));
    assert!(ctx.position_manager.position().is_long());
    assert_eq!(feed.price_calls.load(Ordering::SeqCst), 0);
    assert!(store.snapshots.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_paper_entry_uses_ticker_price() {
    // Ticker differs from the last close so the fill price shows which one was used
    let feed = Arc::new(FakeFeed::new(selloff_candles(), 81.0));
    let store = Arc::new(MemoryStore::default());
    let bot = bot(false, feed.clone(), Arc::new(FakeGateway::new(false, 0.0)), store.clone());
    let mut ctx = bot.initial_context();

    let report = completed(bot.run_tick(&mut ctx).await.unwrap());

    assert_eq!(report.signal, scalper::Signal::Buy);
    assert_eq!(report.action, TradeAction::Buy);
    assert_eq!(report.position, "LONG");
    assert_eq!(report.price, 81.0);
    assert_eq!(feed.price_calls.load(Ordering::SeqCst), 1);

    let long = match ctx.position_manager.position() {
        Position::Long(long) => long.clone(),
        Position::Flat => panic!("expected LONG"),
    };
    assert_eq!(long.entry_price, 81.0);
    assert!((long.size - 100_000.0 / 81.0).abs() < 1e-9);
    assert_eq!(long.stop_loss, 81.0 * (1.0 - 0.02));

    // Paper BUY debits price x amount
    assert!((ctx.balance - (1_000_000.0 - 81.0 * long.size)).abs() < 1e-6);
    assert!((ctx.balance - 900_000.0).abs() < 1e-6);

    let trades = store.trades.lock().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].action, TradeAction::Buy);
    assert_eq!(trades[0].signal, scalper::Signal::Buy);
    assert_eq!(trades[0].price, 81.0);
    assert_eq!(trades[0].amount, long.size);
    assert_eq!(trades[0].profit_loss, None);
    assert_eq!(trades[0].balance, ctx.balance);
}

#[tokio::test]
async fn test_breaker_blocks_entry_after_daily_loss() {
    let feed = Arc::new(FakeFeed::new(selloff_candles(), 81.0));
    let store = Arc::new(MemoryStore::default());
    let bot = bot(false, feed, Arc::new(FakeGateway::new(false, 0.0)), store.clone());
    let mut ctx = bot.initial_context();
    ctx.trading_state.daily_pnl = -60_000.0;

    let report = completed(bot.run_tick(&mut ctx).await.unwrap());

    // The signal is still reported, but no entry is made
    assert_eq!(report.signal, scalper::Signal::Buy);
    assert_eq!(report.action, TradeAction::Hold);
    assert!(!ctx.position_manager.position().is_long());
    assert_eq!(ctx.balance, 1_000_000.0);
    assert!(store.trades.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_price_fetch_failure_aborts_tick() {
    let mut feed = FakeFeed::new(selloff_candles(), 81.0);
    feed.price_fails = true;
    let feed = Arc::new(feed);
    let store = Arc::new(MemoryStore::default());
    let bot = bot(false, feed.clone(), Arc::new(FakeGateway::new(false, 0.0)), store.clone());
    let mut ctx = long_context(&bot, 110.0);
    let position_before = ctx.position_manager.position().clone();

    let outcome = bot.run_tick(&mut ctx).await.unwrap();

    assert!(matches!(outcome, TickOutcome::Aborted { .. }));
    assert_eq!(feed.price_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.balance, 1_000_000.0);
    assert_eq!(ctx.position_manager.position(), &position_before);
    assert_eq!(ctx.trading_state.daily_trades, 0);
    assert!(store.trades.lock().unwrap().is_empty());
    assert!(store.snapshots.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_backs_off_after_error_and_stops_on_request() {
    let mut feed = FakeFeed::new(candles(100), 100.0);
    feed.unexpected = true;
    let feed = Arc::new(feed);
    let config = config_with(Settings {
        error_backoff_secs: 1,
        ..Settings::default()
    });
    let bot = TradingBot::new(
        config,
        feed.clone(),
        Arc::new(FakeGateway::new(false, 0.0)),
        Arc::new(MemoryStore::default()),
    );
    let shutdown = bot.shutdown_handle();

    let started = Instant::now();
    let handle = tokio::spawn(async move {
        let mut ctx = bot.initial_context();
        bot.run(&mut ctx).await;
        ctx
    });

    // First tick fails at once, the second waits out the back-off
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(feed.candle_calls.load(Ordering::SeqCst), 1);

    while feed.candle_calls.load(Ordering::SeqCst) < 2 {
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(started.elapsed() >= std::time::Duration::from_millis(900));

    // Stop request interrupts the back-off sleep
    shutdown.request();
    let ctx = tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("run loop did not stop")
        .unwrap();
    assert_eq!(ctx.balance, 1_000_000.0);
    assert!(feed.candle_calls.load(Ordering::SeqCst) <= 3);
}

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::TradeStore;
use crate::models::{MarketSnapshotRecord, Signal, TradeAction, TradeRecord};
use crate::Result;

/// SQLite persistence for trades and market snapshots
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to SQLite, creating the database file if needed
    ///
    /// # Arguments
    /// * `database_url` - e.g. `sqlite://trades.db` or `sqlite::memory:`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Each in-memory connection is its own database, so keep exactly one alive
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to SQLite at {}", database_url);

        Ok(Self { pool })
    }

    fn trade_from_row(row: &SqliteRow) -> Result<TradeRecord> {
        let action: String = row.try_get("action")?;
        let signal: String = row.try_get("signal")?;

        Ok(TradeRecord {
            id: Some(row.try_get("id")?),
            timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
            pair: row.try_get("pair")?,
            action: TradeAction::from_str(&action)?,
            price: row.try_get("price")?,
            amount: row.try_get("amount")?,
            total: row.try_get("total")?,
            signal: Signal::from_str(&signal)?,
            profit_loss: row.try_get("profit_loss")?,
            balance: row.try_get("balance")?,
        })
    }
}

#[async_trait]
impl TradeStore for SqliteStore {
    async fn append_trade(&self, trade: &TradeRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (
                timestamp, pair, action, price, amount, total, signal, profit_loss, balance
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trade.timestamp)
        .bind(&trade.pair)
        .bind(trade.action.as_str())
        .bind(trade.price)
        .bind(trade.amount)
        .bind(trade.total)
        .bind(trade.signal.as_str())
        .bind(trade.profit_loss)
        .bind(trade.balance)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!("Saved {} trade {} for {}", trade.action, id, trade.pair);

        Ok(id)
    }

    async fn upsert_market_snapshot(&self, snapshot: &MarketSnapshotRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market_data (
                timestamp, pair, open, high, low, close, volume, rsi, macd, ma_fast, ma_slow
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (timestamp, pair) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume,
                rsi = excluded.rsi,
                macd = excluded.macd,
                ma_fast = excluded.ma_fast,
                ma_slow = excluded.ma_slow
            "#,
        )
        .bind(snapshot.timestamp)
        .bind(&snapshot.pair)
        .bind(snapshot.open)
        .bind(snapshot.high)
        .bind(snapshot.low)
        .bind(snapshot.close)
        .bind(snapshot.volume)
        .bind(snapshot.rsi)
        .bind(snapshot.macd)
        .bind(snapshot.ma_fast)
        .bind(snapshot.ma_slow)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read_trade_history(&self, limit: usize) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, pair, action, price, amount, total, signal, profit_loss, balance
            FROM trades
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::trade_from_row).collect()
    }
}

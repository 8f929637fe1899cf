pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::models::{MarketSnapshotRecord, TradeRecord};
use crate::Result;

/// Storage for fills and per-tick market snapshots
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert a fill, returning its id
    async fn append_trade(&self, trade: &TradeRecord) -> Result<i64>;

    /// Insert or replace the snapshot keyed by (timestamp, pair)
    async fn upsert_market_snapshot(&self, snapshot: &MarketSnapshotRecord) -> Result<()>;

    /// Most recent fills first
    async fn read_trade_history(&self, limit: usize) -> Result<Vec<TradeRecord>>;
}

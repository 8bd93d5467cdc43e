// =============================================================================
// Sample Store
// =============================================================================
//
// The engine only needs two read queries from persistent storage; they are
// expressed by the `SampleStore` trait so analysis code never sees SQL. The
// concrete SQLite adapter additionally serves the raw snapshot endpoints and
// the writer side used by the external poller.

pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::RawRecord;

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// Read-side capability the analytics engine depends on.
pub trait SampleStore: Send + Sync {
    /// Timestamp of the most recent snapshot, `None` when the store is empty.
    fn latest_snapshot_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// All per-subnet records whose snapshot timestamp is `>= lower_bound`,
    /// ordered by netuid, then snapshot timestamp.
    fn records_since(&self, lower_bound: DateTime<Utc>) -> Result<Vec<RawRecord>, StoreError>;
}

/// One subnet entry produced by the ledger for a single poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub netuid: u16,
    pub subnet_name: String,
    pub symbol: String,
    pub price: f64,
    pub emission: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetRecord {
    pub record_id: i64,
    pub snapshot_id: i64,
    /// As stored; the analytics read path skips rows outside the `u16` range.
    pub netuid: i64,
    pub subnet_name: Option<String>,
    pub symbol: Option<String>,
    pub price: Option<f64>,
    pub emission: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotWithRecords {
    pub snapshot_id: i64,
    pub snapshot_timestamp: DateTime<Utc>,
    pub records: Vec<SubnetRecord>,
}

/// Optional equality filters for [`SqliteStore::query_records`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordFilter {
    #[serde(default)]
    pub netuid: Option<u16>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub emission: Option<f64>,
}

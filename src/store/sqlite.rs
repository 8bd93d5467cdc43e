// =============================================================================
// SQLite-backed sample store
// =============================================================================
//
// Two tables, one row per poll cycle and one row per subnet per poll cycle:
//
//   subnet_snapshots(snapshot_id, snapshot_timestamp)
//   subnet_records(record_id, snapshot_id, netuid, subnet_name, symbol,
//                  price, emission)
//
// Timestamps are stored as epoch milliseconds. Price and emission cells are
// read leniently: REAL and INTEGER cells are used as-is, TEXT cells are
// parsed, anything else (NULL, unparsable text, non-finite) reads as missing
// so the engine can exclude the subnet instead of treating it as zero.
// =============================================================================

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use super::{
    LedgerEntry, RecordFilter, SampleStore, SnapshotWithRecords, StoreError, SubnetRecord,
};
use crate::types::{from_epoch_ms, to_epoch_ms, RawRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS subnet_snapshots (
    snapshot_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_ts ON subnet_snapshots(snapshot_timestamp);

CREATE TABLE IF NOT EXISTS subnet_records (
    record_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id INTEGER NOT NULL REFERENCES subnet_snapshots(snapshot_id),
    netuid      INTEGER NOT NULL,
    subnet_name TEXT,
    symbol      TEXT,
    price       REAL,
    emission    REAL
);
CREATE INDEX IF NOT EXISTS idx_records_snapshot ON subnet_records(snapshot_id);
CREATE INDEX IF NOT EXISTS idx_records_netuid ON subnet_records(netuid);
";

/// SQLite store. The connection is opened once at startup and shared through
/// `Arc<SqliteStore>`; the mutex serialises access since `Connection` is not
/// `Sync`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and ensure the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        info!(path = %path.display(), "sqlite store opened");
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Durably record one poll cycle. Returns the new snapshot id.
    pub fn record_snapshot(
        &self,
        timestamp: DateTime<Utc>,
        entries: &[LedgerEntry],
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO subnet_snapshots (snapshot_timestamp) VALUES (?1)",
            params![to_epoch_ms(timestamp)],
        )?;
        let snapshot_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO subnet_records
                    (snapshot_id, netuid, subnet_name, symbol, price, emission)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for e in entries {
                stmt.execute(params![
                    snapshot_id,
                    e.netuid,
                    e.subnet_name,
                    e.symbol,
                    e.price,
                    e.emission
                ])?;
            }
        }

        tx.commit()?;
        debug!(snapshot_id, records = entries.len(), "snapshot recorded");
        Ok(snapshot_id)
    }

    /// Most recent snapshot with all of its records.
    pub fn latest_snapshot(&self) -> Result<Option<SnapshotWithRecords>, StoreError> {
        let conn = self.conn.lock();
        let head: Option<(i64, i64)> = conn
            .query_row(
                "SELECT snapshot_id, snapshot_timestamp FROM subnet_snapshots
                 ORDER BY snapshot_timestamp DESC, snapshot_id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match head {
            Some((id, ts)) => Ok(Some(load_snapshot(&conn, id, ts)?)),
            None => Ok(None),
        }
    }

    /// Snapshot by id with all of its records.
    pub fn snapshot(&self, snapshot_id: i64) -> Result<Option<SnapshotWithRecords>, StoreError> {
        let conn = self.conn.lock();
        let ts: Option<i64> = conn
            .query_row(
                "SELECT snapshot_timestamp FROM subnet_snapshots WHERE snapshot_id = ?1",
                params![snapshot_id],
                |row| row.get(0),
            )
            .optional()?;
        match ts {
            Some(ts) => Ok(Some(load_snapshot(&conn, snapshot_id, ts)?)),
            None => Ok(None),
        }
    }

    /// Records matching every supplied filter, newest first.
    pub fn query_records(&self, filter: &RecordFilter) -> Result<Vec<SubnetRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT record_id, snapshot_id, netuid, subnet_name, symbol, price, emission
             FROM subnet_records WHERE 1=1",
        );
        let mut args: Vec<Value> = Vec::new();

        if let Some(netuid) = filter.netuid {
            args.push(Value::Integer(i64::from(netuid)));
            sql.push_str(&format!(" AND netuid = ?{}", args.len()));
        }
        if let Some(price) = filter.price {
            args.push(Value::Real(price));
            sql.push_str(&format!(" AND price = ?{}", args.len()));
        }
        if let Some(emission) = filter.emission {
            args.push(Value::Real(emission));
            sql.push_str(&format!(" AND emission = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY record_id DESC");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map_subnet_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl SampleStore for SqliteStore {
    fn latest_snapshot_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn.lock();
        let ms: Option<i64> = conn.query_row(
            "SELECT MAX(snapshot_timestamp) FROM subnet_snapshots",
            [],
            |row| row.get(0),
        )?;
        ms.map(|ms| from_epoch_ms(ms).ok_or(StoreError::InvalidTimestamp(ms)))
            .transpose()
    }

    fn records_since(&self, lower_bound: DateTime<Utc>) -> Result<Vec<RawRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT r.netuid, s.snapshot_timestamp, r.price, r.emission
             FROM subnet_records r
             JOIN subnet_snapshots s ON r.snapshot_id = s.snapshot_id
             WHERE s.snapshot_timestamp >= ?1
             ORDER BY r.netuid, s.snapshot_timestamp",
        )?;
        let rows = stmt.query_map(params![to_epoch_ms(lower_bound)], |row| {
            Ok((
                row.get::<_, Value>(0)?,
                row.get::<_, i64>(1)?,
                metric(row.get_ref(2)?),
                metric(row.get_ref(3)?),
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (raw_netuid, ms, price, emission) = row?;
            let Some(netuid) = parse_netuid(&raw_netuid) else {
                warn!(netuid = ?raw_netuid, "skipping record with invalid netuid");
                continue;
            };
            let timestamp = from_epoch_ms(ms).ok_or(StoreError::InvalidTimestamp(ms))?;
            records.push(RawRecord {
                netuid,
                timestamp,
                price,
                emission,
            });
        }
        debug!(
            lower_bound = %lower_bound,
            count = records.len(),
            "records fetched"
        );
        Ok(records)
    }
}

fn load_snapshot(
    conn: &Connection,
    snapshot_id: i64,
    ts_ms: i64,
) -> Result<SnapshotWithRecords, StoreError> {
    let snapshot_timestamp = from_epoch_ms(ts_ms).ok_or(StoreError::InvalidTimestamp(ts_ms))?;
    let mut stmt = conn.prepare(
        "SELECT record_id, snapshot_id, netuid, subnet_name, symbol, price, emission
         FROM subnet_records WHERE snapshot_id = ?1 ORDER BY netuid",
    )?;
    let records = stmt
        .query_map(params![snapshot_id], map_subnet_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SnapshotWithRecords {
        snapshot_id,
        snapshot_timestamp,
        records,
    })
}

fn map_subnet_record(row: &Row<'_>) -> rusqlite::Result<SubnetRecord> {
    Ok(SubnetRecord {
        record_id: row.get(0)?,
        snapshot_id: row.get(1)?,
        netuid: row.get(2)?,
        subnet_name: row.get(3)?,
        symbol: row.get(4)?,
        price: metric(row.get_ref(5)?),
        emission: metric(row.get_ref(6)?),
    })
}

/// A stored netuid cell, if it is an integer within the `u16` range.
fn parse_netuid(value: &Value) -> Option<u16> {
    match value {
        Value::Integer(i) => u16::try_from(*i).ok(),
        _ => None,
    }
}

/// Lenient numeric read of a metric cell.
fn metric(value: ValueRef<'_>) -> Option<f64> {
    let parsed = match value {
        ValueRef::Real(f) => Some(f),
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Text(t) => std::str::from_utf8(t).ok()?.trim().parse::<f64>().ok(),
        ValueRef::Null | ValueRef::Blob(_) => None,
    };
    parsed.filter(|f| f.is_finite())
}

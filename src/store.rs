// 🗄️ Transaction Store - CSV import and SQLite persistence
//
// The analytics engines never call into this module. It exists so the
// service and CLI have somewhere to get a batch of records from.
//
// CSV layout: id,account_id,kind,amount,timestamp

use crate::error::{AnalyticsError, Result};
use crate::record::{parse_timestamp, TransactionKind, TransactionRecord};
use crate::service::TransactionSource;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stored timestamp layout; round-trips through `parse_timestamp`
const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ============================================================================
// CSV
// ============================================================================

/// One CSV row before field validation
#[derive(Debug, Deserialize)]
struct RecordRow {
    #[serde(default)]
    id: String,
    account_id: String,
    kind: String,
    amount: String,
    timestamp: String,
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<TransactionRecord>> {
    let file = std::fs::File::open(csv_path)?;
    let records = load_csv_from_reader(file)?;
    info!(path = %csv_path.display(), count = records.len(), "loaded records from CSV");
    Ok(records)
}

/// Parse every row; the first malformed row aborts the load.
///
/// Rows without an id get one derived from their content and row index,
/// so reloading the same file yields the same ids while identical rows
/// still stay distinct records.
pub fn load_csv_from_reader<R: Read>(reader: R) -> Result<Vec<TransactionRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut records = Vec::new();

    for (index, result) in rdr.records().enumerate() {
        let raw = result?;
        // Line where the row starts; quoted fields may span several lines
        let line = raw.position().map_or(0, |p| p.line());
        let row: RecordRow = raw.deserialize(Some(&headers))?;

        let mut record = TransactionRecord::parse(
            &row.id,
            &row.account_id,
            &row.kind,
            &row.amount,
            &row.timestamp,
        )
        .map_err(|e| AnalyticsError::InvalidRow {
            line,
            source: Box::new(e),
        })?;

        if row.id.trim().is_empty() {
            record.id = derived_row_id(index, &record);
        }
        records.push(record);
    }

    Ok(records)
}

fn derived_row_id(index: usize, record: &TransactionRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}", index, content_hash(record)));
    let digest = format!("{:x}", hasher.finalize());
    format!("row-{}", &digest[..32])
}

// ============================================================================
// SQLITE
// ============================================================================

/// Hash of the record's fields other than `id`. Two genuine transactions
/// may share it; it only tells a re-import apart from an id clash.
pub fn content_hash(record: &TransactionRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}",
        record.account_id,
        record.kind,
        record.amount,
        record.timestamp.format(DB_TIMESTAMP_FORMAT)
    ));
    format!("{:x}", hasher.finalize())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            content_hash TEXT NOT NULL,
            account_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount REAL NOT NULL,
            timestamp TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_account ON records(account_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records(timestamp)",
        [],
    )?;

    Ok(())
}

/// Insert records keyed by `id`. A record whose id is already stored with
/// the same content is skipped; the same id with different content is an
/// error. Returns how many were new.
pub fn insert_records(conn: &Connection, records: &[TransactionRecord]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for record in records {
        let hash = content_hash(record);

        let stored_hash: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM records WHERE id = ?1",
                params![record.id],
                |row| row.get(0),
            )
            .optional()?;

        match stored_hash {
            Some(existing) if existing == hash => {
                duplicates += 1;
                continue;
            }
            Some(_) => {
                return Err(AnalyticsError::IdConflict {
                    id: record.id.clone(),
                })
            }
            None => {}
        }

        conn.execute(
            "INSERT INTO records (id, content_hash, account_id, kind, amount, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                hash,
                record.account_id,
                record.kind.as_str(),
                record.amount,
                record.timestamp.format(DB_TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        inserted += 1;
    }

    info!(inserted, duplicates, "stored records");

    Ok(inserted)
}

pub fn get_all_records(conn: &Connection) -> Result<Vec<TransactionRecord>> {
    query_records(
        conn,
        "SELECT id, account_id, kind, amount, timestamp
         FROM records
         ORDER BY timestamp, row_id",
        None,
    )
}

pub fn get_records_by_account(conn: &Connection, account_id: &str) -> Result<Vec<TransactionRecord>> {
    query_records(
        conn,
        "SELECT id, account_id, kind, amount, timestamp
         FROM records
         WHERE account_id = ?1
         ORDER BY timestamp, row_id",
        Some(account_id),
    )
}

pub fn count_records(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
    Ok(count)
}

fn query_records(
    conn: &Connection,
    sql: &str,
    account_id: Option<&str>,
) -> Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(sql)?;

    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String, String, f64, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    };

    let rows = match account_id {
        Some(account) => stmt
            .query_map(params![account], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        None => stmt
            .query_map([], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
    };

    // Stored text goes through the same parsers as CSV input
    let records = rows
        .into_iter()
        .map(|(id, account_id, kind, amount, timestamp)| -> Result<TransactionRecord> {
            Ok(TransactionRecord {
                id,
                account_id,
                kind: kind.parse::<TransactionKind>()?,
                amount,
                timestamp: parse_timestamp(&timestamp)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(count = records.len(), "read records from database");

    Ok(records)
}

// ============================================================================
// SOURCES
// ============================================================================

/// Reads the whole CSV file on every call
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSource { path: path.into() }
    }
}

impl TransactionSource for CsvSource {
    fn all_records(&self) -> Result<Vec<TransactionRecord>> {
        load_csv(&self.path)
    }
}

pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        setup_database(&conn)?;
        Ok(SqliteSource { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        SqliteSource { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl TransactionSource for SqliteSource {
    fn all_records(&self) -> Result<Vec<TransactionRecord>> {
        get_all_records(&self.conn)
    }

    fn records_for_account(&self, account_id: &str) -> Result<Vec<TransactionRecord>> {
        get_records_by_account(&self.conn, account_id)
    }
}

// ============================================================================
// TESTS
// ============================================================================

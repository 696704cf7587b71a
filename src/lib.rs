// Account Analytics - Core Library
// Transaction statistics and anomaly detection over in-memory batches.
// The engines (statistics, anomaly) are pure; store and service feed them.

pub mod error;
pub mod record;
pub mod statistics;
pub mod anomaly;
pub mod service;
pub mod store;
pub mod transfers;
pub mod config;

// Re-export commonly used types
pub use error::{AnalyticsError, Result};
pub use record::{parse_amount, parse_timestamp, TransactionKind, TransactionRecord};
pub use statistics::{AccountSummary, ActivityGrid, DailyFlow, Percentiles, StatisticsEngine};
pub use anomaly::{
    AnomalyDetector, AnomalyReport, DetectorConfig, StructuringPair,
    DEFAULT_STRUCTURING_AMOUNT_THRESHOLD, DEFAULT_STRUCTURING_WINDOW_MINUTES, DEFAULT_Z_THRESHOLD,
};
pub use service::{AnalyticsService, InMemorySource, TransactionSource};
pub use store::{
    content_hash, count_records, get_all_records, get_records_by_account, insert_records,
    load_csv, load_csv_from_reader, setup_database, CsvSource, SqliteSource,
};
pub use transfers::{
    load_transfers_csv, load_transfers_from_reader, TransferEdge, TransferGraph, TransferRecord,
};
pub use config::{AnalyticsConfig, StoreConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ❗ Error types for the analytics library
//
// Input-format problems surface here when a record is built from text.
// Degenerate batches (empty, zero variance) are never errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid timestamp '{value}': expected ISO-8601 date-time (YYYY-MM-DDTHH:MM[:SS])")]
    InvalidTimestamp { value: String },

    #[error("Invalid amount '{value}': not a finite number")]
    InvalidAmount { value: String },

    #[error("Unknown transaction kind '{0}' (expected deposit, withdrawal, transfer_in or transfer_out)")]
    UnknownKind(String),

    #[error("Line {line}: {source}")]
    InvalidRow {
        line: u64,
        #[source]
        source: Box<AnalyticsError>,
    },

    #[error("Record id '{id}' is already stored with different content")]
    IdConflict { id: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

// 🧾 Transaction Record - the only entity the analytics core reads
//
// Fixed-shape value type with a closed kind enumeration. Records are built
// once (typed or parsed from text) and never mutated by the engines.

use crate::error::{AnalyticsError, Result};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accepted timestamp layouts, tried in order. Seconds and fractional
/// seconds are optional; no timezone is read or applied.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// ============================================================================
// TRANSACTION KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::TransferIn => "transfer_in",
            TransactionKind::TransferOut => "transfer_out",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer_in" => Ok(TransactionKind::TransferIn),
            "transfer_out" => Ok(TransactionKind::TransferOut),
            _ => Err(AnalyticsError::UnknownKind(s.to_string())),
        }
    }
}

// ============================================================================
// TRANSACTION RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub account_id: String,
    pub kind: TransactionKind,
    /// Positive by upstream contract; not re-checked here
    pub amount: f64,
    pub timestamp: NaiveDateTime,
}

impl TransactionRecord {
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        kind: TransactionKind,
        amount: f64,
        timestamp: NaiveDateTime,
    ) -> Self {
        TransactionRecord {
            id: id.into(),
            account_id: account_id.into(),
            kind,
            amount,
            timestamp,
        }
    }

    /// Build a record from raw text fields (CSV cells, form input).
    ///
    /// An empty id gets a fresh UUID v4. Kind, amount and timestamp
    /// failures are returned as-is; nothing is corrected silently.
    pub fn parse(
        id: &str,
        account_id: &str,
        kind: &str,
        amount: &str,
        timestamp: &str,
    ) -> Result<Self> {
        let kind = kind.parse::<TransactionKind>()?;
        let amount = parse_amount(amount)?;
        let timestamp = parse_timestamp(timestamp)?;

        let id = if id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            id.trim().to_string()
        };

        Ok(TransactionRecord {
            id,
            account_id: account_id.trim().to_string(),
            kind,
            amount,
            timestamp,
        })
    }

    /// Calendar date in the record's own naive representation
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    pub fn is_kind(&self, kind: TransactionKind) -> bool {
        self.kind == kind
    }
}

// ============================================================================
// FIELD PARSERS
// ============================================================================

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| AnalyticsError::InvalidTimestamp {
            value: value.to_string(),
        })
}

pub fn parse_amount(value: &str) -> Result<f64> {
    match value.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() => Ok(amount),
        _ => Err(AnalyticsError::InvalidAmount {
            value: value.to_string(),
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================

// 📊 Statistics Engine - aggregate metrics over a batch of transactions
//
// Every function is a pure computation over the slice it is given.
// Percentiles and standard deviation are recomputed from the full amount
// array on each call. An empty batch yields zeros/empty maps, never an error.

use crate::record::{TransactionKind, TransactionRecord};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

// ============================================================================
// RESULT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

/// All per-account metrics computed from one snapshot of records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub total_deposits: f64,
    pub total_withdrawals: f64,
    /// `f64::INFINITY` when there are no withdrawals
    #[serde(serialize_with = "serialize_ratio")]
    pub ratio: f64,
    pub average_per_day: f64,
    pub std_dev: f64,
    pub percentiles: Percentiles,
}

impl AccountSummary {
    pub fn has_withdrawals(&self) -> bool {
        self.ratio.is_finite()
    }

    pub fn summary(&self) -> String {
        let ratio = if self.ratio.is_finite() {
            format!("{:.2}", self.ratio)
        } else {
            "inf".to_string()
        };
        format!(
            "Deposits: ${:.2}, Withdrawals: ${:.2}, Ratio: {}, Per day: {:.2}, StdDev: {:.2}, P50/P90/P99: {:.2}/{:.2}/{:.2}",
            self.total_deposits,
            self.total_withdrawals,
            ratio,
            self.average_per_day,
            self.std_dev,
            self.percentiles.p50,
            self.percentiles.p90,
            self.percentiles.p99
        )
    }
}

// JSON has no infinity literal
fn serialize_ratio<S: Serializer>(ratio: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if ratio.is_infinite() {
        serializer.serialize_str("inf")
    } else {
        serializer.serialize_f64(*ratio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DailyFlow {
    pub deposits: f64,
    pub withdrawals: f64,
    pub net: f64,
}

/// Record counts by weekday (Monday first) and hour of day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityGrid {
    pub counts: [[usize; 24]; 7],
}

impl ActivityGrid {
    pub fn get(&self, weekday: Weekday, hour: u32) -> usize {
        self.counts[weekday.num_days_from_monday() as usize][hour as usize % 24]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Busiest (weekday, hour) cell; `None` when the grid is empty
    pub fn busiest(&self) -> Option<(Weekday, u32, usize)> {
        let mut best: Option<(Weekday, u32, usize)> = None;
        for (day, row) in self.counts.iter().enumerate() {
            for (hour, &count) in row.iter().enumerate() {
                if count > 0 && best.map_or(true, |(_, _, c)| count > c) {
                    best = Some((weekday_from_index(day), hour as u32, count));
                }
            }
        }
        best
    }
}

fn weekday_from_index(index: usize) -> Weekday {
    match index {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

// ============================================================================
// STATISTICS ENGINE
// ============================================================================

pub struct StatisticsEngine;

impl StatisticsEngine {
    /// Sum of amounts for one kind; 0.0 when nothing matches
    pub fn total_by_kind(records: &[TransactionRecord], kind: TransactionKind) -> f64 {
        records
            .iter()
            .filter(|r| r.is_kind(kind))
            .map(|r| r.amount)
            .sum()
    }

    pub fn total_deposits(records: &[TransactionRecord]) -> f64 {
        Self::total_by_kind(records, TransactionKind::Deposit)
    }

    pub fn total_withdrawals(records: &[TransactionRecord]) -> f64 {
        Self::total_by_kind(records, TransactionKind::Withdrawal)
    }

    /// Deposits over withdrawals. Returns `f64::INFINITY` when the
    /// withdrawal total is exactly zero; callers must check before
    /// doing finite arithmetic with it.
    pub fn deposit_to_withdrawal_ratio(records: &[TransactionRecord]) -> f64 {
        let deposits = Self::total_deposits(records);
        let withdrawals = Self::total_withdrawals(records);
        if withdrawals == 0.0 {
            f64::INFINITY
        } else {
            deposits / withdrawals
        }
    }

    pub fn mean_amount(records: &[TransactionRecord]) -> f64 {
        if records.is_empty() {
            return 0.0;
        }
        records.iter().map(|r| r.amount).sum::<f64>() / records.len() as f64
    }

    /// Population standard deviation (divisor N) of every amount, any kind
    pub fn amount_std_dev(records: &[TransactionRecord]) -> f64 {
        if records.is_empty() {
            return 0.0;
        }
        let mean = Self::mean_amount(records);
        let variance = records
            .iter()
            .map(|r| {
                let diff = r.amount - mean;
                diff * diff
            })
            .sum::<f64>()
            / records.len() as f64;
        variance.sqrt()
    }

    pub fn percentiles(records: &[TransactionRecord]) -> Percentiles {
        if records.is_empty() {
            return Percentiles::default();
        }

        let mut amounts: Vec<f64> = records.iter().map(|r| r.amount).collect();
        amounts.sort_by(|a, b| a.total_cmp(b));

        Percentiles {
            p50: interpolated_percentile(&amounts, 50.0),
            p90: interpolated_percentile(&amounts, 90.0),
            p99: interpolated_percentile(&amounts, 99.0),
        }
    }

    /// Records per distinct calendar date present in the batch
    pub fn average_per_day(records: &[TransactionRecord]) -> f64 {
        if records.is_empty() {
            return 0.0;
        }
        let days: HashSet<NaiveDate> = records.iter().map(|r| r.date()).collect();
        records.len() as f64 / days.len() as f64
    }

    pub fn summary_for_account(records: &[TransactionRecord]) -> AccountSummary {
        debug!(records = records.len(), "computing account summary");

        AccountSummary {
            total_deposits: Self::total_deposits(records),
            total_withdrawals: Self::total_withdrawals(records),
            ratio: Self::deposit_to_withdrawal_ratio(records),
            average_per_day: Self::average_per_day(records),
            std_dev: Self::amount_std_dev(records),
            percentiles: Self::percentiles(records),
        }
    }

    pub fn counts_by_day(records: &[TransactionRecord]) -> BTreeMap<NaiveDate, usize> {
        let mut counts = BTreeMap::new();
        for record in records {
            *counts.entry(record.date()).or_insert(0) += 1;
        }
        counts
    }

    /// Deposit/withdrawal sums per date. Every date in the batch gets an
    /// entry, including dates that only carry transfers.
    pub fn daily_flow(records: &[TransactionRecord]) -> BTreeMap<NaiveDate, DailyFlow> {
        let mut flows: BTreeMap<NaiveDate, DailyFlow> = BTreeMap::new();

        for record in records {
            let flow = flows.entry(record.date()).or_default();
            match record.kind {
                TransactionKind::Deposit => flow.deposits += record.amount,
                TransactionKind::Withdrawal => flow.withdrawals += record.amount,
                TransactionKind::TransferIn | TransactionKind::TransferOut => {}
            }
        }

        for flow in flows.values_mut() {
            flow.net = flow.deposits - flow.withdrawals;
        }

        flows
    }

    pub fn activity_grid(records: &[TransactionRecord]) -> ActivityGrid {
        let mut counts = [[0usize; 24]; 7];
        for record in records {
            let day = record.timestamp.weekday().num_days_from_monday() as usize;
            counts[day][record.hour() as usize] += 1;
        }
        ActivityGrid { counts }
    }
}

/// Linear interpolation between order statistics at rank `q/100 * (n - 1)`.
/// `sorted` must be non-empty and ascending.
fn interpolated_percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q / 100.0) * (sorted.len() - 1) as f64;
    let lower_index = rank.floor() as usize;
    let upper_index = rank.ceil() as usize;

    let lower = sorted[lower_index];
    let upper = sorted[upper_index];
    let fraction = rank - lower_index as f64;

    // Clamp keeps rounding from overshooting the next order statistic
    (lower + (upper - lower) * fraction).min(upper)
}

// ============================================================================
// TESTS
// ============================================================================

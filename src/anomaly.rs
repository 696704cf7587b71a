// 🚨 Anomaly Detector - three independent suspicious-pattern rules
//
// Rule A: statistical outliers (z-score over the whole batch)
// Rule B: structuring (adjacent small deposits into one account)
// Rule C: night activity (hour of day in [0, 4))
//
// Rules never call each other and never mutate the batch. A record may be
// flagged by more than one rule.

use crate::record::{TransactionKind, TransactionRecord};
use crate::statistics::StatisticsEngine;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;
pub const DEFAULT_STRUCTURING_WINDOW_MINUTES: i64 = 30;
pub const DEFAULT_STRUCTURING_AMOUNT_THRESHOLD: f64 = 100.0;

/// Night window is [NIGHT_START_HOUR, NIGHT_END_HOUR)
pub const NIGHT_START_HOUR: u32 = 0;
pub const NIGHT_END_HOUR: u32 = 4;

// ============================================================================
// DETECTOR CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Outlier sensitivity; used literally, no bounds check
    pub z_threshold: f64,

    /// Maximum gap (exclusive) between two structuring deposits
    pub structuring_window_minutes: i64,

    /// Both deposits must be strictly below this amount
    pub structuring_amount_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            z_threshold: DEFAULT_Z_THRESHOLD,
            structuring_window_minutes: DEFAULT_STRUCTURING_WINDOW_MINUTES,
            structuring_amount_threshold: DEFAULT_STRUCTURING_AMOUNT_THRESHOLD,
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Two deposits that sat next to each other in timestamp order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuringPair {
    pub first: TransactionRecord,
    pub second: TransactionRecord,
}

impl StructuringPair {
    pub fn account_id(&self) -> &str {
        &self.first.account_id
    }

    pub fn minutes_apart(&self) -> f64 {
        (self.second.timestamp - self.first.timestamp).num_seconds() as f64 / 60.0
    }

    pub fn combined_amount(&self) -> f64 {
        self.first.amount + self.second.amount
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnomalyReport {
    pub outliers: Vec<TransactionRecord>,
    pub structuring: Vec<StructuringPair>,
    pub night_activity: Vec<TransactionRecord>,
}

impl AnomalyReport {
    /// Number of flags raised; a record flagged twice counts twice
    pub fn total_flags(&self) -> usize {
        self.outliers.len() + self.structuring.len() + self.night_activity.len()
    }

    pub fn is_clean(&self) -> bool {
        self.total_flags() == 0
    }

    /// Sorted, de-duplicated ids of every record any rule touched
    pub fn flagged_ids(&self) -> BTreeSet<String> {
        self.outliers
            .iter()
            .chain(self.night_activity.iter())
            .chain(
                self.structuring
                    .iter()
                    .flat_map(|p| [&p.first, &p.second]),
            )
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} outliers, {} structuring pairs, {} night transactions ({} distinct records)",
            self.outliers.len(),
            self.structuring.len(),
            self.night_activity.len(),
            self.flagged_ids().len()
        )
    }
}

// ============================================================================
// ANOMALY DETECTOR
// ============================================================================

pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    /// Detector with default thresholds (3.0 / 30 min / 100)
    pub fn new() -> Self {
        Self::with_config(DetectorConfig::default())
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        AnomalyDetector { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run all three rules over the same batch
    pub fn detect(&self, records: &[TransactionRecord]) -> AnomalyReport {
        let report = AnomalyReport {
            outliers: Self::z_score_outliers(records, self.config.z_threshold),
            structuring: Self::structuring(
                records,
                self.config.structuring_window_minutes,
                self.config.structuring_amount_threshold,
            ),
            night_activity: Self::night_activity(records),
        };

        debug!(
            records = records.len(),
            outliers = report.outliers.len(),
            structuring = report.structuring.len(),
            night = report.night_activity.len(),
            "anomaly detection finished"
        );

        report
    }

    // ========================================================================
    // RULE A: Z-SCORE OUTLIERS
    // ========================================================================

    /// Records whose |amount - mean| / stddev is strictly above `threshold`.
    /// Empty batch or zero variance yields no outliers.
    pub fn z_score_outliers(records: &[TransactionRecord], threshold: f64) -> Vec<TransactionRecord> {
        if records.is_empty() {
            return Vec::new();
        }

        let std_dev = StatisticsEngine::amount_std_dev(records);
        if std_dev == 0.0 {
            return Vec::new();
        }
        let mean = StatisticsEngine::mean_amount(records);

        records
            .iter()
            .filter(|r| (r.amount - mean).abs() / std_dev > threshold)
            .cloned()
            .collect()
    }

    // ========================================================================
    // RULE B: STRUCTURING
    // ========================================================================

    /// Adjacent pairs in timestamp order that are both small deposits into
    /// the same account, less than `window_minutes` apart.
    ///
    /// Only direct neighbours are compared: two qualifying deposits with any
    /// other record between them in sorted order are not reported.
    pub fn structuring(
        records: &[TransactionRecord],
        window_minutes: i64,
        amount_threshold: f64,
    ) -> Vec<StructuringPair> {
        let mut sorted: Vec<&TransactionRecord> = records.iter().collect();
        // sort_by_key is stable: equal timestamps keep input order
        sorted.sort_by_key(|r| r.timestamp);

        // Out-of-range windows saturate instead of panicking
        let window = TimeDelta::try_minutes(window_minutes).unwrap_or(if window_minutes < 0 {
            TimeDelta::MIN
        } else {
            TimeDelta::MAX
        });

        sorted
            .windows(2)
            .filter(|pair| {
                let (t1, t2) = (pair[0], pair[1]);
                t1.is_kind(TransactionKind::Deposit)
                    && t2.is_kind(TransactionKind::Deposit)
                    && t1.account_id == t2.account_id
                    && t2.timestamp - t1.timestamp < window
                    && t1.amount < amount_threshold
                    && t2.amount < amount_threshold
            })
            .map(|pair| StructuringPair {
                first: pair[0].clone(),
                second: pair[1].clone(),
            })
            .collect()
    }

    // ========================================================================
    // RULE C: NIGHT ACTIVITY
    // ========================================================================

    pub fn night_activity(records: &[TransactionRecord]) -> Vec<TransactionRecord> {
        records
            .iter()
            .filter(|r| (NIGHT_START_HOUR..NIGHT_END_HOUR).contains(&r.hour()))
            .cloned()
            .collect()
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").unwrap()
    }

    fn deposit(id: &str, account: &str, amount: f64, when: &str) -> TransactionRecord {
        TransactionRecord::new(id, account, TransactionKind::Deposit, amount, ts(when))
    }

    fn withdrawal(id: &str, account: &str, amount: f64, when: &str) -> TransactionRecord {
        TransactionRecord::new(id, account, TransactionKind::Withdrawal, amount, ts(when))
    }

    fn ids(records: &[TransactionRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    // ------------------------------------------------------------------------
    // Rule A
    // ------------------------------------------------------------------------

    #[test]
    fn test_zscore_flags_large_outlier() {
        let mut batch: Vec<TransactionRecord> = (0..20)
            .map(|i| deposit(&format!("n{}", i), "A", 50.0 + i as f64, "2026-02-01T10:00"))
            .collect();
        batch.push(deposit("big", "A", 5000.0, "2026-02-01T11:00"));

        let outliers = AnomalyDetector::z_score_outliers(&batch, DEFAULT_Z_THRESHOLD);
        assert_eq!(ids(&outliers), vec!["big"]);
    }

    #[test]
    fn test_zscore_zero_variance_is_empty() {
        let batch: Vec<TransactionRecord> = (0..5)
            .map(|i| deposit(&i.to_string(), "A", 25.0, "2026-02-01T10:00"))
            .collect();

        for threshold in [-1.0, 0.0, 3.0] {
            assert!(AnomalyDetector::z_score_outliers(&batch, threshold).is_empty());
        }
        assert!(AnomalyDetector::z_score_outliers(&[], 0.0).is_empty());
    }

    #[test]
    fn test_zscore_zero_threshold_skips_exact_mean() {
        let batch = vec![
            deposit("low", "A", 10.0, "2026-02-01T10:00"),
            deposit("mean", "A", 20.0, "2026-02-01T10:05"),
            deposit("high", "A", 30.0, "2026-02-01T10:10"),
        ];

        let outliers = AnomalyDetector::z_score_outliers(&batch, 0.0);
        assert_eq!(ids(&outliers), vec!["low", "high"]);
    }

    #[test]
    fn test_zscore_negative_threshold_flags_everything() {
        let batch = vec![
            deposit("a", "A", 10.0, "2026-02-01T10:00"),
            deposit("b", "A", 20.0, "2026-02-01T10:05"),
            deposit("c", "A", 30.0, "2026-02-01T10:10"),
        ];

        assert_eq!(AnomalyDetector::z_score_outliers(&batch, -0.5).len(), 3);
    }

    // ------------------------------------------------------------------------
    // Rule B
    // ------------------------------------------------------------------------

    #[test]
    fn test_structuring_flags_small_adjacent_deposits() {
        let batch = vec![
            deposit("d1", "A", 40.0, "2026-02-01T10:00"),
            deposit("d2", "A", 60.0, "2026-02-01T10:05"),
        ];

        let pairs = AnomalyDetector::structuring(
            &batch,
            DEFAULT_STRUCTURING_WINDOW_MINUTES,
            DEFAULT_STRUCTURING_AMOUNT_THRESHOLD,
        );

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].first.id, "d1");
        assert_eq!(pairs[0].second.id, "d2");
        assert_eq!(pairs[0].account_id(), "A");
        assert_eq!(pairs[0].minutes_apart(), 5.0);
        assert_eq!(pairs[0].combined_amount(), 100.0);
    }

    #[test]
    fn test_structuring_amount_threshold_is_strict() {
        let over = vec![
            deposit("d1", "A", 40.0, "2026-02-01T10:00"),
            deposit("d2", "A", 150.0, "2026-02-01T10:05"),
        ];
        assert!(AnomalyDetector::structuring(&over, 30, 100.0).is_empty());

        let at_limit = vec![
            deposit("d1", "A", 40.0, "2026-02-01T10:00"),
            deposit("d2", "A", 100.0, "2026-02-01T10:05"),
        ];
        assert!(AnomalyDetector::structuring(&at_limit, 30, 100.0).is_empty());
    }

    #[test]
    fn test_structuring_window_is_strict() {
        let batch = vec![
            deposit("d1", "A", 40.0, "2026-02-01T10:00"),
            deposit("d2", "A", 40.0, "2026-02-01T10:30"),
        ];
        assert!(AnomalyDetector::structuring(&batch, 30, 100.0).is_empty());
        assert_eq!(AnomalyDetector::structuring(&batch, 31, 100.0).len(), 1);
    }

    #[test]
    fn test_structuring_extreme_windows() {
        assert!(AnomalyDetector::structuring(&[], i64::MAX, 100.0).is_empty());
        assert!(AnomalyDetector::structuring(&[], i64::MIN, 100.0).is_empty());

        let batch = vec![
            deposit("d1", "A", 40.0, "2020-01-01T10:00"),
            deposit("d2", "A", 40.0, "2026-02-01T10:00"),
        ];
        assert_eq!(AnomalyDetector::structuring(&batch, i64::MAX, 100.0).len(), 1);
        assert!(AnomalyDetector::structuring(&batch, i64::MIN, 100.0).is_empty());
    }

    #[test]
    fn test_structuring_only_scans_adjacent_pairs() {
        // The B record sits between the two A deposits once sorted
        let batch = vec![
            deposit("a2", "A", 50.0, "2026-02-01T10:10"),
            deposit("b1", "B", 500.0, "2026-02-01T10:04"),
            deposit("a1", "A", 50.0, "2026-02-01T10:00"),
        ];

        assert!(AnomalyDetector::structuring(&batch, 30, 100.0).is_empty());
    }

    #[test]
    fn test_structuring_requires_deposits_and_same_account() {
        let mixed_kind = vec![
            deposit("d1", "A", 40.0, "2026-02-01T10:00"),
            withdrawal("w1", "A", 40.0, "2026-02-01T10:05"),
        ];
        assert!(AnomalyDetector::structuring(&mixed_kind, 30, 100.0).is_empty());

        let other_account = vec![
            deposit("d1", "A", 40.0, "2026-02-01T10:00"),
            deposit("d2", "B", 40.0, "2026-02-01T10:05"),
        ];
        assert!(AnomalyDetector::structuring(&other_account, 30, 100.0).is_empty());
    }

    #[test]
    fn test_structuring_sorts_unordered_input_stably() {
        let batch = vec![
            deposit("late", "A", 20.0, "2026-02-01T10:20"),
            deposit("tie1", "A", 10.0, "2026-02-01T10:00"),
            deposit("tie2", "A", 15.0, "2026-02-01T10:00"),
        ];

        let pairs = AnomalyDetector::structuring(&batch, 30, 100.0);
        let flagged: Vec<(&str, &str)> = pairs
            .iter()
            .map(|p| (p.first.id.as_str(), p.second.id.as_str()))
            .collect();

        assert_eq!(flagged, vec![("tie1", "tie2"), ("tie2", "late")]);
        // Input untouched
        assert_eq!(batch[0].id, "late");
    }

    // ------------------------------------------------------------------------
    // Rule C
    // ------------------------------------------------------------------------

    #[test]
    fn test_night_activity_half_open_window() {
        let batch = vec![
            deposit("midnight", "A", 10.0, "2026-02-01T00:00"),
            deposit("early", "A", 10.0, "2026-02-01T02:30"),
            deposit("edge", "A", 10.0, "2026-02-01T04:00"),
            deposit("late", "A", 10.0, "2026-02-01T23:59"),
            deposit("almost", "A", 10.0, "2026-02-01T03:59"),
        ];

        let night = AnomalyDetector::night_activity(&batch);
        assert_eq!(ids(&night), vec!["midnight", "early", "almost"]);
    }

    // ------------------------------------------------------------------------
    // Whole detector
    // ------------------------------------------------------------------------

    #[test]
    fn test_three_record_scenario() {
        let batch = vec![
            deposit("big", "A", 1000.0, "2026-02-01T10:00"),
            deposit("s1", "A", 10.0, "2026-02-01T11:00"),
            deposit("s2", "A", 12.0, "2026-02-01T11:05"),
        ];

        let report = AnomalyDetector::new().detect(&batch);

        // Three points cap the population z-score at sqrt(2)
        assert!(report.outliers.is_empty());
        assert_eq!(ids(&AnomalyDetector::z_score_outliers(&batch, 1.0)), vec!["big"]);

        assert_eq!(report.structuring.len(), 1);
        assert_eq!(report.structuring[0].first.id, "s1");
        assert_eq!(report.structuring[0].second.id, "s2");
        assert!(report.night_activity.is_empty());
    }

    #[test]
    fn test_report_overlapping_flags() {
        let batch = vec![
            deposit("n1", "A", 10.0, "2026-02-01T01:00"),
            deposit("n2", "A", 12.0, "2026-02-01T01:10"),
            deposit("day", "B", 300.0, "2026-02-01T14:00"),
        ];

        let report = AnomalyDetector::with_config(DetectorConfig {
            z_threshold: 1.0,
            ..DetectorConfig::default()
        })
        .detect(&batch);

        assert_eq!(ids(&report.outliers), vec!["day"]);
        assert_eq!(report.structuring.len(), 1);
        assert_eq!(ids(&report.night_activity), vec!["n1", "n2"]);
        assert_eq!(report.total_flags(), 4);

        let flagged: Vec<String> = report.flagged_ids().into_iter().collect();
        assert_eq!(flagged, vec!["day", "n1", "n2"]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_empty_batch_is_clean() {
        let report = AnomalyDetector::default().detect(&[]);
        assert!(report.is_clean());
        assert!(report.flagged_ids().is_empty());
    }
}

// 🔌 Analytics Service - wires a record source to the engines
//
// The engines take batches as arguments; this is the only place that asks a
// store for records.

use crate::anomaly::{AnomalyDetector, AnomalyReport, DetectorConfig};
use crate::error::Result;
use crate::record::TransactionRecord;
use crate::statistics::{AccountSummary, DailyFlow, StatisticsEngine};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// TRANSACTION SOURCE
// ============================================================================

/// Anything that can hand over a full batch of records
pub trait TransactionSource {
    fn all_records(&self) -> Result<Vec<TransactionRecord>>;

    /// Default filters `all_records`; stores with an index should override
    fn records_for_account(&self, account_id: &str) -> Result<Vec<TransactionRecord>> {
        Ok(self
            .all_records()?
            .into_iter()
            .filter(|r| r.account_id == account_id)
            .collect())
    }
}

/// Fixed batch held in memory (tests, embedding)
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<TransactionRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        InMemorySource { records }
    }
}

impl TransactionSource for InMemorySource {
    fn all_records(&self) -> Result<Vec<TransactionRecord>> {
        Ok(self.records.clone())
    }
}

// ============================================================================
// ANALYTICS SERVICE
// ============================================================================

pub struct AnalyticsService<S: TransactionSource> {
    source: S,
}

impl<S: TransactionSource> AnalyticsService<S> {
    pub fn new(source: S) -> Self {
        AnalyticsService { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn summary_for_account(&self, account_id: &str) -> Result<AccountSummary> {
        let records = self.source.records_for_account(account_id)?;
        debug!(account_id, records = records.len(), "summarizing account");
        Ok(StatisticsEngine::summary_for_account(&records))
    }

    pub fn counts_by_day(&self) -> Result<BTreeMap<NaiveDate, usize>> {
        let records = self.source.all_records()?;
        Ok(StatisticsEngine::counts_by_day(&records))
    }

    pub fn daily_flow(&self) -> Result<BTreeMap<NaiveDate, DailyFlow>> {
        let records = self.source.all_records()?;
        Ok(StatisticsEngine::daily_flow(&records))
    }

    /// One summary per account, all computed from the same snapshot
    pub fn summaries_by_account(&self) -> Result<BTreeMap<String, AccountSummary>> {
        let records = self.source.all_records()?;

        let mut by_account: BTreeMap<String, Vec<TransactionRecord>> = BTreeMap::new();
        for record in records {
            by_account
                .entry(record.account_id.clone())
                .or_default()
                .push(record);
        }

        Ok(by_account
            .into_iter()
            .map(|(account, batch)| (account, StatisticsEngine::summary_for_account(&batch)))
            .collect())
    }

    pub fn anomalies(&self, config: &DetectorConfig) -> Result<AnomalyReport> {
        let records = self.source.all_records()?;
        Ok(AnomalyDetector::with_config(config.clone()).detect(&records))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;
    use crate::record::TransactionKind;
    use chrono::NaiveDateTime;

    fn record(id: &str, account: &str, kind: TransactionKind, amount: f64, when: &str) -> TransactionRecord {
        TransactionRecord::new(
            id,
            account,
            kind,
            amount,
            NaiveDateTime::parse_from_str(when, "%Y-%m-%dT%H:%M").unwrap(),
        )
    }

    fn service() -> AnalyticsService<InMemorySource> {
        AnalyticsService::new(InMemorySource::new(vec![
            record("1", "001", TransactionKind::Deposit, 40.0, "2026-02-01T10:00"),
            record("2", "001", TransactionKind::Withdrawal, 20.0, "2026-02-01T10:30"),
            record("3", "001", TransactionKind::TransferOut, 30.0, "2026-02-02T09:00"),
            record("4", "002", TransactionKind::TransferIn, 30.0, "2026-02-02T09:00"),
            record("5", "002", TransactionKind::Deposit, 10.0, "2026-02-03T01:15"),
        ]))
    }

    struct FailingSource;

    impl TransactionSource for FailingSource {
        fn all_records(&self) -> Result<Vec<TransactionRecord>> {
            Err(AnalyticsError::InvalidTimestamp {
                value: "garbage".to_string(),
            })
        }
    }

    #[test]
    fn test_summary_for_account_filters_by_account() {
        let summary = service().summary_for_account("001").unwrap();

        assert_eq!(summary.total_deposits, 40.0);
        assert_eq!(summary.total_withdrawals, 20.0);
        assert_eq!(summary.ratio, 2.0);
        assert_eq!(summary.average_per_day, 1.5);
    }

    #[test]
    fn test_unknown_account_gets_empty_summary() {
        let summary = service().summary_for_account("999").unwrap();
        assert_eq!(summary, StatisticsEngine::summary_for_account(&[]));
    }

    #[test]
    fn test_system_wide_daily_metrics() {
        let svc = service();

        let counts = svc.counts_by_day().unwrap();
        assert_eq!(counts.values().copied().collect::<Vec<_>>(), vec![2, 2, 1]);

        let flows = svc.daily_flow().unwrap();
        let day2 = flows[&NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()];
        assert_eq!(day2, DailyFlow::default());
    }

    #[test]
    fn test_summaries_by_account() {
        let summaries = service().summaries_by_account().unwrap();

        assert_eq!(summaries.keys().collect::<Vec<_>>(), vec!["001", "002"]);
        assert!(summaries["002"].ratio.is_infinite());
    }

    #[test]
    fn test_anomalies_use_given_config() {
        let report = service().anomalies(&DetectorConfig::default()).unwrap();

        assert_eq!(report.night_activity.len(), 1);
        assert_eq!(report.night_activity[0].id, "5");
        assert!(report.structuring.is_empty());
    }

    #[test]
    fn test_source_errors_propagate() {
        let svc = AnalyticsService::new(FailingSource);

        assert!(matches!(
            svc.summary_for_account("001"),
            Err(AnalyticsError::InvalidTimestamp { .. })
        ));
        assert!(svc.anomalies(&DetectorConfig::default()).is_err());
    }
}

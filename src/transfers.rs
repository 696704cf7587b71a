// 🔀 Transfer Graph - who sends money to whom
//
// Directed, weighted: one edge per (from, to) account pair, accumulating
// the total amount and number of transfers.
//
// CSV layout: id,from_account,to_account,amount,timestamp

use crate::error::{AnalyticsError, Result};
use crate::record::{parse_amount, parse_timestamp};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: String,
    pub from_account: String,
    pub to_account: String,
    pub amount: f64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
struct TransferRow {
    #[serde(default)]
    id: String,
    from_account: String,
    to_account: String,
    amount: String,
    timestamp: String,
}

pub fn load_transfers_csv(csv_path: &Path) -> Result<Vec<TransferRecord>> {
    let file = std::fs::File::open(csv_path)?;
    let transfers = load_transfers_from_reader(file)?;
    info!(path = %csv_path.display(), count = transfers.len(), "loaded transfers from CSV");
    Ok(transfers)
}

pub fn load_transfers_from_reader<R: Read>(reader: R) -> Result<Vec<TransferRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut transfers = Vec::new();

    for result in rdr.records() {
        let raw = result?;
        let line = raw.position().map_or(0, |p| p.line());
        let row: TransferRow = raw.deserialize(Some(&headers))?;
        let wrap = |e: AnalyticsError| AnalyticsError::InvalidRow {
            line,
            source: Box::new(e),
        };

        let id = if row.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            row.id.trim().to_string()
        };

        transfers.push(TransferRecord {
            id,
            from_account: row.from_account.trim().to_string(),
            to_account: row.to_account.trim().to_string(),
            amount: parse_amount(&row.amount).map_err(wrap)?,
            timestamp: parse_timestamp(&row.timestamp).map_err(wrap)?,
        });
    }

    Ok(transfers)
}

// ============================================================================
// GRAPH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TransferEdge {
    pub total_amount: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TransferGraph {
    edges: BTreeMap<(String, String), TransferEdge>,
    nodes: BTreeSet<String>,
}

impl TransferGraph {
    pub fn build(transfers: &[TransferRecord]) -> Self {
        let mut graph = TransferGraph::default();

        for transfer in transfers {
            graph.nodes.insert(transfer.from_account.clone());
            graph.nodes.insert(transfer.to_account.clone());

            let edge = graph
                .edges
                .entry((transfer.from_account.clone(), transfer.to_account.clone()))
                .or_default();
            edge.total_amount += transfer.amount;
            edge.count += 1;
        }

        graph
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&TransferEdge> {
        self.edges.get(&(from.to_string(), to.to_string()))
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &TransferEdge)> {
        self.edges
            .iter()
            .map(|((from, to), edge)| (from.as_str(), to.as_str(), edge))
    }

    /// In-degree plus out-degree. A self-transfer counts twice.
    pub fn degree(&self, account: &str) -> usize {
        self.edges
            .keys()
            .map(|(from, to)| usize::from(from == account) + usize::from(to == account))
            .sum()
    }

    pub fn degrees(&self) -> BTreeMap<String, usize> {
        let mut degrees: BTreeMap<String, usize> =
            self.nodes.iter().map(|n| (n.clone(), 0)).collect();

        for (from, to) in self.edges.keys() {
            *degrees.entry(from.clone()).or_default() += 1;
            *degrees.entry(to.clone()).or_default() += 1;
        }

        degrees
    }

    pub fn summary(&self) -> String {
        format!("{} accounts, {} transfer routes", self.node_count(), self.edge_count())
    }
}

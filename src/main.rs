use account_analytics::{
    insert_records, load_csv, load_transfers_csv, AnalyticsConfig, AnalyticsService, CsvSource,
    DailyFlow, SqliteSource, TransactionSource, TransferGraph,
};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "account-analytics", version, about = "Transaction statistics and anomaly detection")]
struct Cli {
    /// TOML config file (defaults to ./analytics.toml when present)
    #[arg(long, global = true, env = "ANALYTICS_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database holding imported records
    #[arg(long, global = true, env = "ANALYTICS_DB")]
    db: Option<PathBuf>,

    /// Read records straight from a CSV file instead of the database
    #[arg(long, global = true)]
    csv: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import a CSV of records into the database
    Import { file: PathBuf },
    /// Summary metrics for one account
    Summary { account_id: String },
    /// Record counts and deposit/withdrawal flow per day
    Daily,
    /// Summary metrics for every account
    Dashboard,
    /// Run all anomaly rules
    Anomalies {
        /// Z-score threshold for outliers
        #[arg(long)]
        threshold: Option<f64>,
        /// Structuring window in minutes
        #[arg(long)]
        window_minutes: Option<i64>,
        /// Structuring amount ceiling
        #[arg(long)]
        amount_threshold: Option<f64>,
    },
    /// Transfer graph metrics from a transfers CSV
    Transfers { file: PathBuf },
}

#[derive(Serialize)]
struct DailyReport {
    counts: BTreeMap<NaiveDate, usize>,
    flow: BTreeMap<NaiveDate, DailyFlow>,
}

#[derive(Serialize)]
struct TransferReport {
    nodes: usize,
    edges: usize,
    degrees: BTreeMap<String, usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("account_analytics=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AnalyticsConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    // Flags win over the config file
    if let Some(db) = &cli.db {
        config.store.database = db.clone();
    }
    if let Some(csv) = &cli.csv {
        config.store.csv = Some(csv.clone());
    }

    match &cli.command {
        Command::Import { file } => run_import(&config, file),
        Command::Transfers { file } => run_transfers(file, cli.json),
        command => match &config.store.csv {
            Some(csv_path) => {
                info!(path = %csv_path.display(), "reading records from CSV");
                run_analytics(AnalyticsService::new(CsvSource::new(csv_path)), command, &config, cli.json)
            }
            None => {
                let source = SqliteSource::open(&config.store.database).with_context(|| {
                    format!("Failed to open database {}", config.store.database.display())
                })?;
                run_analytics(AnalyticsService::new(source), command, &config, cli.json)
            }
        },
    }
}

fn run_import(config: &AnalyticsConfig, file: &Path) -> Result<()> {
    println!("🗄️  Importing {}", file.display());

    let records = load_csv(file).context("Failed to load CSV file")?;
    println!("✓ Loaded {} records from CSV", records.len());

    if let Some(parent) = config.store.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    let source = SqliteSource::open(&config.store.database).context("Failed to open database")?;
    let inserted = insert_records(source.connection(), &records)?;

    println!("✓ Inserted: {}", inserted);
    println!("✓ Skipped duplicates: {}", records.len() - inserted);

    Ok(())
}

fn run_analytics<S: TransactionSource>(
    service: AnalyticsService<S>,
    command: &Command,
    config: &AnalyticsConfig,
    json: bool,
) -> Result<()> {
    match command {
        Command::Summary { account_id } => {
            let summary = service.summary_for_account(account_id)?;
            if json {
                print_json(&summary)?;
            } else {
                println!("📊 Account {}", account_id);
                println!("{}", summary.summary());
            }
        }
        Command::Daily => {
            let report = DailyReport {
                counts: service.counts_by_day()?,
                flow: service.daily_flow()?,
            };
            if json {
                print_json(&report)?;
            } else {
                println!("📅 Daily activity");
                for (day, flow) in &report.flow {
                    println!(
                        "{} | {:>4} tx | +${:.2} -${:.2} = ${:.2}",
                        day,
                        report.counts.get(day).copied().unwrap_or(0),
                        flow.deposits,
                        flow.withdrawals,
                        flow.net
                    );
                }
            }
        }
        Command::Dashboard => {
            let summaries = service.summaries_by_account()?;
            if json {
                print_json(&summaries)?;
            } else {
                println!("🏦 {} accounts", summaries.len());
                for (account, summary) in &summaries {
                    println!("{} | {}", account, summary.summary());
                }
            }
        }
        Command::Anomalies {
            threshold,
            window_minutes,
            amount_threshold,
        } => {
            let mut detector = config.detector.clone();
            if let Some(t) = threshold {
                detector.z_threshold = *t;
            }
            if let Some(w) = window_minutes {
                detector.structuring_window_minutes = *w;
            }
            if let Some(a) = amount_threshold {
                detector.structuring_amount_threshold = *a;
            }

            let report = service.anomalies(&detector)?;
            if json {
                print_json(&report)?;
            } else {
                println!("🚨 {}", report.summary());

                println!("\n--- Z-score outliers ---");
                for t in &report.outliers {
                    println!("{} | {} | ${:.2} | ID: {}", t.timestamp, t.kind, t.amount, t.id);
                }

                println!("\n--- Structuring ---");
                for pair in &report.structuring {
                    println!(
                        "{} and {} | {:.2} + {:.2} | Account: {}",
                        pair.first.timestamp,
                        pair.second.timestamp,
                        pair.first.amount,
                        pair.second.amount,
                        pair.account_id()
                    );
                }

                println!("\n--- Night activity ---");
                for t in &report.night_activity {
                    println!("{} | {} | ${:.2} | ID: {}", t.timestamp, t.kind, t.amount, t.id);
                }
            }
        }
        Command::Import { .. } | Command::Transfers { .. } => {
            bail!("command does not read from the record store")
        }
    }

    Ok(())
}

fn run_transfers(file: &Path, json: bool) -> Result<()> {
    let transfers = load_transfers_csv(file).context("Failed to load transfers CSV")?;
    let graph = TransferGraph::build(&transfers);

    let report = TransferReport {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        degrees: graph.degrees(),
    };

    if json {
        print_json(&report)?;
    } else {
        println!("🔀 {}", graph.summary());
        for (from, to, edge) in graph.edges() {
            println!("{} -> {} | {} transfers | ${:.2}", from, to, edge.count, edge.total_amount);
        }
        for (account, degree) in &report.degrees {
            println!("  - Account {}: degree {}", account, degree);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

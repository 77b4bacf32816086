use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod assigner;
mod clustering;
mod config;
mod db;
mod eligibility;
mod error;
mod metrics;
mod models;
mod planner;
mod report;
mod scheduler;
mod store;

use config::PlannerConfig;
use error::PlanError;
use planner::Planner;

#[derive(Parser)]
#[command(name = "visit-planner")]
#[command(about = "Weekly volunteer visit planner for seniors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed {
        /// Date the upcoming target week is computed from
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Import seniors, volunteers or availability from a CSV file
    Import {
        #[arg(long, value_enum)]
        kind: db::ImportKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Cluster seniors, assign volunteers and write next week's schedule
    Run {
        /// Invocation date; defaults to today (UTC)
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Compute everything but skip the writes
        #[arg(long)]
        dry_run: bool,
        /// Print the run diagnostics as JSON on stderr
        #[arg(long)]
        show_diagnostics: bool,
        #[command(flatten)]
        config: PlannerConfig,
    },
    /// Write a per-volunteer markdown digest of the target week
    Report {
        #[arg(long)]
        today: Option<NaiveDate>,
        #[arg(long, default_value = "schedule.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed { today } => {
            db::seed(&pool, today.unwrap_or_else(eligibility::today)).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { kind, csv } => {
            let written = db::import_csv(&pool, kind, &csv).await?;
            println!("Imported {written} {kind:?} rows from {}.", csv.display());
        }
        Commands::Run {
            today,
            dry_run,
            show_diagnostics,
            config,
        } => {
            let today = today.unwrap_or_else(eligibility::today);
            let result = run_once(&pool, config, today, dry_run).await;

            if show_diagnostics {
                if let Ok(outcome) = &result {
                    eprintln!("{}", serde_json::to_string_pretty(&outcome.diagnostics)?);
                }
            }
            println!("{}", serde_json::to_string_pretty(&run_response(&result)?)?);
            if result.is_err() {
                pool.close().await;
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Report { today, out } => {
            let week = eligibility::target_week(today.unwrap_or_else(eligibility::today));
            let visits = db::fetch_week_visits(&pool, week).await?;
            let report = report::build_report(week, &visits);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// JSON body printed on stdout for a `run` invocation.
fn run_response(
    result: &Result<models::RunOutcome, PlanError>,
) -> serde_json::Result<serde_json::Value> {
    match result {
        Ok(outcome) => serde_json::to_value(&outcome.summary),
        Err(err) => Ok(serde_json::json!({ "error": err.to_string() })),
    }
}

/// Runs the planner while holding the single-run advisory lock.
async fn run_once(
    pool: &sqlx::PgPool,
    config: PlannerConfig,
    today: NaiveDate,
    dry_run: bool,
) -> Result<models::RunOutcome, PlanError> {
    let lock = db::try_acquire_run_lock(pool)
        .await
        .map_err(PlanError::lock)?
        .ok_or(PlanError::Locked)?;

    let store = db::PgStore::new(pool.clone());
    let result = Planner::new(&store, config).run(today, dry_run).await;

    if let Err(err) = lock.release().await {
        warn!(error = %err, "failed to release run lock");
    }
    if let Ok(outcome) = &result {
        info!(
            week_start = %outcome.week.start,
            clusters = outcome.clusters.len(),
            visits = outcome.assignments.len(),
            unscheduled = outcome.diagnostics.unscheduled_seniors.len(),
            uncovered = outcome.diagnostics.uncovered_clusters.len(),
            clean = outcome.diagnostics.is_clean(),
            "run finished"
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{Diagnostics, RunOutcome, RunSummary};

    #[test]
    fn successful_run_prints_the_summary() {
        let week = eligibility::target_week(NaiveDate::from_ymd_opt(2026, 10, 15).unwrap());
        let outcome = RunOutcome {
            summary: RunSummary {
                message: "Schedules generated successfully".to_string(),
                clusters_count: 2,
                schedules_created: 9,
            },
            week,
            clusters: Vec::new(),
            assignments: Vec::new(),
            diagnostics: Diagnostics::default(),
        };

        let body = run_response(&Ok(outcome)).unwrap();
        assert_eq!(body["clusters_count"], 2);
        assert_eq!(body["schedules_created"], 9);
        assert!(body.get("error").is_none());
    }

    #[test]
    fn lock_contention_and_lock_failure_read_differently() {
        let busy = run_response(&Err(PlanError::Locked)).unwrap();
        assert_eq!(busy["error"], "another scheduling run is in progress");

        let broken =
            run_response(&Err(PlanError::lock(anyhow::anyhow!("pool timed out")))).unwrap();
        assert_eq!(broken["error"], "failed to acquire run lock: pool timed out");
    }
}

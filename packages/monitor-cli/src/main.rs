//! Operator CLI for the competitive-intelligence monitor.
//!
//! Drives the batch runner against Postgres: start or continue a baseline
//! scan, resume after an error pause, inspect progress, and browse detected
//! changes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use monitor_core::{
    BaselineStore, BatchJobRunner, ChangeStore, HttpFetcher, JobMode, JobStatus, JobStore,
    MonitorConfig, NoopScheduler, PostgresStore, RunSummary,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "monitor")]
#[command(about = "Competitive-intelligence monitor: batched scans and change history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Process every configured URL
    All,
    /// Only URLs without a stored baseline
    New,
}

impl From<ModeArg> for JobMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::All => JobMode::All,
            ModeArg::New => JobMode::New,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the next batch of the baseline scan, starting a job if needed
    Run {
        /// Company configuration file (JSON)
        #[arg(long, default_value = "monitors.json")]
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = ModeArg::All)]
        mode: ModeArg,
        /// Wipe stored baselines before building the worklist (all mode only)
        #[arg(long)]
        clear: bool,
        /// Keep running batches until the job completes or pauses
        #[arg(long)]
        follow: bool,
    },

    /// Resume a job paused by repeated errors
    Resume {
        #[arg(long, default_value = "monitors.json")]
        config: PathBuf,
        #[arg(long)]
        follow: bool,
    },

    /// Cancel the active job
    Cancel,

    /// Show job progress and baseline statistics
    Status,

    /// List recently detected changes
    Changes {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete baselines older than the given age
    Cleanup {
        #[arg(long, default_value_t = 90)]
        days: i64,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "monitor=info,monitor_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let pool = connect().await?;

    match cli.command {
        Commands::Run {
            config,
            mode,
            clear,
            follow,
        } => run(pool, &config, mode.into(), clear, follow).await,
        Commands::Resume { config, follow } => resume(pool, &config, follow).await,
        Commands::Cancel => cancel(pool).await,
        Commands::Status => status(pool).await,
        Commands::Changes { limit } => changes(pool, limit).await,
        Commands::Cleanup { days } => cleanup(pool, days).await,
        Commands::Migrate => migrate(pool).await,
    }
}

async fn connect() -> Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")
}

fn build_runner(pool: PgPool, monitors: MonitorConfig) -> Result<BatchJobRunner> {
    let store = Arc::new(PostgresStore::new(pool));
    Ok(BatchJobRunner::new(
        Arc::new(HttpFetcher::new()?),
        store.clone(),
        store.clone(),
        store,
        Arc::new(NoopScheduler),
        monitors,
    ))
}

async fn run(
    pool: PgPool,
    config: &PathBuf,
    mode: JobMode,
    clear: bool,
    follow: bool,
) -> Result<()> {
    let monitors = MonitorConfig::from_json_file(config)?;
    let runner = build_runner(pool, monitors)?;

    let mut summary = runner.run_next_batch(mode, clear).await;
    print_summary(&summary);

    // With --follow the CLI acts as the continuation scheduler itself.
    while follow && summary.status == JobStatus::InProgress {
        summary = runner.run_next_batch(mode, false).await;
        print_summary(&summary);
    }

    Ok(())
}

async fn resume(pool: PgPool, config: &PathBuf, follow: bool) -> Result<()> {
    let monitors = MonitorConfig::from_json_file(config)?;
    let runner = build_runner(pool, monitors)?;

    let mut summary = runner.resume_job().await?;
    print_summary(&summary);

    while follow && summary.status == JobStatus::InProgress {
        summary = runner.run_next_batch(JobMode::All, false).await;
        print_summary(&summary);
    }

    Ok(())
}

async fn cancel(pool: PgPool) -> Result<()> {
    // Cancellation never touches the worklist config.
    let runner = build_runner(pool, MonitorConfig::default())?;
    runner.cancel_job().await?;
    println!("{}", "Baseline job cancelled".green());
    Ok(())
}

async fn status(pool: PgPool) -> Result<()> {
    let store = PostgresStore::new(pool);

    match JobStore::get(&store).await? {
        Some(job) => {
            println!("{}", "Active job".bold());
            println!("  id:       {}", job.id);
            println!("  status:   {}", status_label(job.status));
            println!(
                "  progress: {}/{} ({} successful, {} failed)",
                job.processed_urls,
                job.total(),
                job.successful_urls,
                job.failed_urls
            );
            println!("  started:  {}", job.start_time.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("  updated:  {}", job.last_update.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(error) = &job.last_critical_error {
                println!("  error:    {}", error.red());
            }
        }
        None => println!("{}", "No active job".dimmed()),
    }

    let stats = BaselineStore::stats(&store).await?;
    println!();
    println!("{}", "Baselines".bold());
    println!("  total:              {}", stats.total);
    println!("  companies:          {}", stats.companies);
    println!("  avg content length: {}", stats.avg_content_length);

    Ok(())
}

async fn changes(pool: PgPool, limit: usize) -> Result<()> {
    let store = PostgresStore::new(pool);
    let changes = ChangeStore::recent(&store, limit).await?;

    if changes.is_empty() {
        println!("{}", "No changes detected yet".dimmed());
        return Ok(());
    }

    for change in changes {
        println!(
            "{} {} {} ({}%, {}, relevance {}/10)",
            change.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            change.company.bold(),
            change.url,
            change.percentage_change,
            change.magnitude.as_str(),
            change.relevance_score
        );
        println!("    {}", change.summary);
        if !change.keywords.is_empty() {
            println!("    keywords: {}", change.keywords.join(", ").dimmed());
        }
    }

    Ok(())
}

async fn cleanup(pool: PgPool, days: i64) -> Result<()> {
    let store = PostgresStore::new(pool);
    let cutoff = Utc::now() - Duration::days(days);
    let removed = BaselineStore::delete_older_than(&store, cutoff).await?;
    println!("Removed {removed} baselines older than {days} days");
    Ok(())
}

async fn migrate(pool: PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    println!("{}", "Migrations applied".green());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {}",
        status_label(summary.status),
        summary.message
    );
    println!(
        "  {}/{} processed ({} successful, {} failed, {}% complete)",
        summary.processed,
        summary.total,
        summary.successful,
        summary.failed,
        summary.percent_complete
    );
    if let Some(eta) = summary.estimated_minutes_remaining {
        println!("  estimated time remaining: {eta} minutes");
    }
    for error in &summary.recent_errors {
        println!("  {} {} - {}", "error:".red(), error.url, error.error);
    }
}

fn status_label(status: JobStatus) -> colored::ColoredString {
    match status {
        JobStatus::Completed => "completed".green(),
        JobStatus::InProgress => "in progress".cyan(),
        JobStatus::PausedError => "paused (errors)".yellow(),
        JobStatus::Error => "error".red(),
    }
}

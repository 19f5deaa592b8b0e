//! LabStock CLI
//!
//! Command-line interface for the LabStock inventory alerting service.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use labstock::alerting::{AlertEvaluator, NotificationSender, SweepOutcome, Sweeper};
use labstock::api::{AppState, HttpServer};
use labstock::config::LoggingConfig;
use labstock::db::{Database, InMemoryAlertRepository, InMemoryPartRepository, PostgresPool};
use labstock::models::PartView;
use labstock::Config;

/// LabStock - Laboratory inventory with low-stock alerting
#[derive(Parser)]
#[command(name = "labstock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "LABSTOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the scheduled alert sweep
    Serve {
        /// HTTP API port (overrides server.http_port)
        #[arg(long, env = "LABSTOCK_HTTP_PORT")]
        http_port: Option<u16>,

        /// Use in-memory stores instead of PostgreSQL
        #[arg(long)]
        in_memory: bool,
    },

    /// Run one alert sweep and exit
    Sweep,

    /// Show alert summary statistics
    Summary,

    /// Adjust a part's stock and reconcile its alert
    Adjust {
        /// Part ID
        part_id: Uuid,

        /// Quantity change (negative to remove stock)
        #[arg(allow_negative_numbers = true)]
        delta: i32,
    },

    /// List active parts with their stock status
    Parts {
        /// Only show parts that are low or out of stock
        #[arg(long)]
        low: bool,
    },

    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Show system health status
    Health,
}

#[derive(Subcommand)]
enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // A missing .env is fine
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; the guard flushes file output on exit
    let _log_guard = init_logging(&config.logging, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Serve {
            http_port,
            in_memory,
        } => run_serve(config, http_port, in_memory).await,
        Commands::Sweep => run_sweep(config, cli.format).await,
        Commands::Summary => run_summary(config, cli.format).await,
        Commands::Adjust { part_id, delta } => run_adjust(config, part_id, delta, cli.format).await,
        Commands::Parts { low } => run_parts(config, low, cli.format).await,
        Commands::Db { command } => run_db(config, command).await,
        Commands::Health => run_health(config, cli.format).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "labstock.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    guard
}

async fn build_evaluator(config: &Config, in_memory: bool) -> anyhow::Result<AlertEvaluator> {
    let evaluator = if in_memory {
        warn!("Using in-memory stores, data is lost on exit");
        AlertEvaluator::new(
            Arc::new(InMemoryPartRepository::new()),
            Arc::new(InMemoryAlertRepository::new()),
        )
    } else {
        let db = Database::new(config)
            .await
            .context("failed to connect to the database")?;
        let (parts, alerts) = db.repositories();
        AlertEvaluator::new(parts, alerts)
    };

    let mut evaluator = evaluator.with_sweep_concurrency(config.alerting.sweep_concurrency);

    if !config.notifications.channels.is_empty() {
        let notifier = NotificationSender::new(config.notifications.channels.clone())?;
        evaluator = evaluator.with_notifier(
            Arc::new(notifier),
            config.notifications.send_sweep_summary,
        );
    }

    Ok(evaluator)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_serve(config: Config, http_port: Option<u16>, in_memory: bool) -> anyhow::Result<()> {
    let metrics = if config.server.metrics_enabled {
        Some(PrometheusBuilder::new().install_recorder()?)
    } else {
        None
    };

    let evaluator = Arc::new(build_evaluator(&config, in_memory).await?);
    let cancel = CancellationToken::new();

    let sweeper = if config.alerting.sweep_enabled {
        Some(Sweeper::new(evaluator.clone(), config.alerting.sweep_interval).spawn(cancel.clone()))
    } else {
        info!("Scheduled alert sweep disabled");
        None
    };

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            shutdown.cancel();
        }
    });

    let port = http_port.unwrap_or(config.server.http_port);
    let addr = format!("{}:{}", config.server.host, port);
    info!("Starting LabStock on {}", addr);

    HttpServer::new(AppState { evaluator, metrics })
        .serve(&addr, cancel.clone())
        .await?;

    cancel.cancel();
    if let Some(handle) = sweeper {
        handle.await?;
    }

    Ok(())
}

async fn run_sweep(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let evaluator = build_evaluator(&config, false).await?;

    match evaluator.run_sweep().await? {
        SweepOutcome::Completed(report) if format == OutputFormat::Json => print_json(&report)?,
        SweepOutcome::Completed(report) => {
            println!("Alert sweep complete");
            println!("  Parts checked:   {}", report.parts_checked);
            println!("  Alerts created:  {}", report.created);
            println!("  Alerts refreshed: {}", report.refreshed);
            println!("  Alerts resolved: {}", report.resolved);
            println!("  Low stock parts: {}", report.low_stock_parts);
            if report.failed > 0 {
                println!("  Failed:          {}", report.failed);
            }
        }
        SweepOutcome::Skipped => println!("Another sweep is already running"),
    }

    Ok(())
}

async fn run_summary(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let evaluator = build_evaluator(&config, false).await?;
    let summary = evaluator.summarize().await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => {
            println!("Alert Summary");
            println!("  Total alerts:        {}", summary.total_alerts);
            println!("  Active alerts:       {}", summary.active_alerts);
            println!("  Resolved alerts:     {}", summary.resolved_alerts);
            println!("  Critical parts low:  {}", summary.critical_parts_low);
            println!("  Out of stock parts:  {}", summary.out_of_stock_parts);
        }
    }

    Ok(())
}

async fn run_adjust(
    config: Config,
    part_id: Uuid,
    delta: i32,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let evaluator = build_evaluator(&config, false).await?;
    let result = evaluator.adjust_stock(part_id, delta).await?;

    if format == OutputFormat::Json {
        return print_json(&result);
    }

    let part = &result.part.part;
    println!(
        "{} {}: {} ({})",
        part.part_number, part.name, part.quantity_in_stock, result.part.stock_status
    );
    match (&result.action, &result.alert_error) {
        (Some(action), _) => println!("Alert: {action:?}"),
        (None, Some(err)) => println!("Alert state may be stale: {err}"),
        (None, None) => {}
    }

    Ok(())
}

async fn run_parts(config: Config, low: bool, format: OutputFormat) -> anyhow::Result<()> {
    let evaluator = build_evaluator(&config, false).await?;
    let parts = if low {
        evaluator.low_stock_parts().await?
    } else {
        evaluator.parts().list().await?
    };
    let views: Vec<PartView> = parts.into_iter().map(PartView::from).collect();

    match format {
        OutputFormat::Json => print_json(&views)?,
        OutputFormat::Text => {
            for view in &views {
                println!(
                    "{}  {:<12} {:<30} {:>6} / {:<6} {}",
                    view.part.id,
                    view.part.part_number,
                    view.part.name,
                    view.part.quantity_in_stock,
                    view.part.minimum_stock_level,
                    view.stock_status
                );
            }
            println!("{} part(s)", views.len());
        }
    }

    Ok(())
}

async fn run_db(config: Config, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let pool = PostgresPool::new(&config.database).await?;
            pool.migrate().await?;
            println!("Migrations applied");
        }
    }
    Ok(())
}

async fn run_health(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let database = match PostgresPool::new(&config.database).await {
        Ok(pool) => pool.health_check().await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "database": match &database {
                Ok(()) => "ok".to_string(),
                Err(e) => e.clone(),
            },
        }))?,
        OutputFormat::Text => {
            println!("System Health Check");
            match &database {
                Ok(()) => println!("Database:  connected"),
                Err(e) => println!("Database:  unavailable ({e})"),
            }
        }
    }

    database.map_err(anyhow::Error::msg)
}

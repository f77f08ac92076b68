//! spanner-migrate CLI - MySQL/PostgreSQL to Cloud Spanner schema and data conversion.

use clap::{Parser, Subcommand};
use spanner_migrate::conv::TableSummary;
use spanner_migrate::orchestrator::apply_edits_from;
use spanner_migrate::{Config, Conv, DataReport, MigrateError, Orchestrator, TypeCatalog};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "spanner-migrate")]
#[command(about = "MySQL/PostgreSQL to Cloud Spanner schema and data conversion")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to the session file (overrides output.session_file)
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Timeout in seconds for graceful shutdown (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the schema model from the source and save the session
    Schema,

    /// Apply column edits to a saved session
    Edit {
        /// YAML or JSON file: table -> column -> edit
        #[arg(long)]
        edits: PathBuf,
    },

    /// Show the target types available for each source type
    Types,

    /// Convert rows for a saved session
    Data,

    /// Build the schema, apply edits and convert data in one go
    Run,

    /// Test the source connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?.with_auto_tuning();
    info!("Loaded configuration from {:?}", cli.config);

    let session_file = cli
        .session_file
        .clone()
        .or_else(|| config.output.session_file.clone());

    // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
    let cancel_token = setup_signal_handler(cli.shutdown_timeout)?;

    match cli.command {
        Commands::Schema => {
            let session = require_session(session_file)?;
            let orchestrator = Orchestrator::new(config).await?.with_session_file(session);
            let conv = orchestrator.build_schema().await?;
            orchestrator.save_session(&conv)?;

            let summaries = conv.table_summaries();
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print_schema_summary(&conv, &summaries);
            }
        }

        Commands::Edit { edits } => {
            let session = require_session(session_file)?;
            let mut conv = Conv::load(&session)?;
            apply_edits_from(&mut conv, &edits)?;
            conv.save(&session)?;

            let summaries = conv.table_summaries();
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print_schema_summary(&conv, &summaries);
            }
        }

        Commands::Types => {
            let catalog = match session_file.as_ref().filter(|p| p.exists()) {
                Some(path) => TypeCatalog::for_conv(&Conv::load(path)?),
                None => TypeCatalog::for_dialect(config.dialect()?).clone(),
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                for (source_type, options) in &catalog.types {
                    println!("{}", source_type);
                    for option in options {
                        let issues: Vec<&str> = option.issues.iter().map(|i| i.brief()).collect();
                        if issues.is_empty() {
                            println!("  {:<10} {}", option.family.as_str(), option.target);
                        } else {
                            println!(
                                "  {:<10} {} ({})",
                                option.family.as_str(),
                                option.target,
                                issues.join("; ")
                            );
                        }
                    }
                }
            }
        }

        Commands::Data => {
            let session = require_session(session_file)?;
            let mut conv = Conv::load(&session)?;
            let orchestrator = Orchestrator::new(config).await?.with_session_file(session);
            let report = orchestrator.convert_data(&mut conv, &cancel_token).await?;
            orchestrator.save_session(&conv)?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_data_report(&report);
                println!("  Data rating: {}", conv.data_rating().as_str());
            }
            if report.cancelled {
                return Err(MigrateError::Cancelled);
            }
        }

        Commands::Run => {
            let mut orchestrator = Orchestrator::new(config).await?;
            if let Some(path) = session_file {
                orchestrator = orchestrator.with_session_file(path);
            }
            let result = orchestrator.run(&cancel_token).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nConversion {}!", result.status.replace('_', " "));
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Schema rating: {}", result.schema_rating.as_str());
                println!("  Data rating: {}", result.data_rating.as_str());
                println!("  Interleaved tables: {}", result.interleaved);
                if !result.skipped_tables.is_empty() {
                    println!("  Skipped tables: {:?}", result.skipped_tables);
                }
                print_data_report(&result.data);
            }
            if result.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    result.dialect,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::pool(
                    result.source_error.unwrap_or_default(),
                    "health check",
                ));
            }
        }
    }

    Ok(())
}

fn require_session(path: Option<PathBuf>) -> Result<PathBuf, MigrateError> {
    path.ok_or_else(|| {
        MigrateError::Config(
            "a session file is required: pass --session-file or set output.session_file"
                .to_string(),
        )
    })
}

fn print_schema_summary(conv: &Conv, summaries: &[TableSummary]) {
    println!("\nSchema ({} source):", conv.dialect);
    for s in summaries {
        let mut notes = Vec::new();
        if s.synthetic_pk {
            notes.push("synthetic key".to_string());
        }
        if let Some(parent) = &s.interleaved_in {
            notes.push(format!("interleaved in {}", parent));
        }
        println!(
            "  {:<6} {} -> {} ({} columns, {} warnings){}",
            s.rating.as_str(),
            s.src_table,
            s.sp_table,
            s.columns,
            s.warnings,
            if notes.is_empty() {
                String::new()
            } else {
                format!(" [{}]", notes.join(", "))
            }
        );
    }
    for (table, err) in &conv.introspection_errors {
        println!("  SKIPPED {}: {}", table, err);
    }
    println!("\n  Overall rating: {}", conv.schema_rating().as_str());
}

fn print_data_report(report: &DataReport) {
    println!(
        "  Tables: {}/{}",
        report.tables_converted, report.tables_total
    );
    println!("  Rows: {}", report.rows);
    println!("  Good rows: {}", report.good_rows);
    println!("  Bad rows: {}", report.bad_rows);
    if !report.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", report.failed_tables);
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Shutting down gracefully (timeout: {}s)...", shutdown_timeout);
        token_int.cancel();
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Shutting down gracefully (timeout: {}s)...", shutdown_timeout);
        token_term.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(_shutdown_timeout: u64) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}

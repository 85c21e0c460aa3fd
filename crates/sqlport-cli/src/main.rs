//! sqlport CLI - streaming MSSQL/PostgreSQL migration script generator.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sqlport::{Config, CreateTable, MigrateError, MigrationResult, Orchestrator, ScriptSink};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "sqlport")]
#[command(about = "Generate a referential-integrity-safe migration script from a live database")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Write the script to this file instead of output.path (use - for stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the run result as JSON
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the source catalog and write the migration script
    Run {
        /// Override source schema
        #[arg(long)]
        schema: Option<String>,

        /// Rows per INSERT statement
        #[arg(long)]
        batch_size: Option<usize>,

        /// Recreate tables: true, false, or a comma-separated table list
        #[arg(long)]
        create_table: Option<String>,

        /// Skip a table (repeatable)
        #[arg(long = "ignore-table")]
        ignore_tables: Vec<String>,

        /// Only migrate this table (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Do not write a byte-order mark at the start of the script file
        #[arg(long)]
        no_bom: bool,

        /// Dry run: list the planned operations without streaming data
        #[arg(long)]
        dry_run: bool,
    },

    /// Test the source database connection
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

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if let Some(path) = &cli.output {
        config.output.path = if path.as_os_str() == "-" {
            None
        } else {
            Some(path.clone())
        };
    }

    match cli.command {
        Commands::Run {
            schema,
            batch_size,
            create_table,
            ignore_tables,
            tables,
            no_bom,
            dry_run,
        } => {
            // Apply overrides
            if let Some(schema) = schema {
                config.source.schema = Some(schema);
            }
            if let Some(size) = batch_size {
                config.migration.data_batch_size = size;
            }
            if let Some(value) = create_table {
                config.migration.create_table = CreateTable::parse(&value);
            }
            if !ignore_tables.is_empty() {
                config.migration.ignore_tables = ignore_tables;
            }
            if !tables.is_empty() {
                config.migration.tables = tables;
            }
            if no_bom {
                config.output.bom = false;
            }
            config.validate()?;

            let to_stdout = config.output.path.is_none();
            let orchestrator = Orchestrator::new(config.clone()).await?;

            if dry_run {
                let steps = orchestrator.plan().await?;
                if cli.output_json {
                    println!("{}", serde_json::to_string_pretty(&steps)?);
                } else {
                    println!("Planned operations:");
                    for step in &steps {
                        println!("  {}", step);
                    }
                }
                return Ok(());
            }

            let cancel_token = setup_signal_handler();
            let sink = ScriptSink::open(&config.output).await?;
            let (result, _) = orchestrator.run(sink, cancel_token).await?;

            report(&result, cli.output_json, to_stdout)?;
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            orchestrator.health_check().await?;
            println!("Source: OK");
        }
    }

    Ok(())
}

/// Print the run summary. When the script itself went to stdout, the summary
/// goes to stderr.
fn report(result: &MigrationResult, as_json: bool, script_on_stdout: bool) -> Result<(), MigrateError> {
    let text = if as_json {
        result.to_json()?
    } else {
        let mut lines = vec![
            "Migration completed!".to_string(),
            format!("  Run ID: {}", result.run_id),
            format!("  Duration: {:.2}s", result.duration_seconds),
            format!("  Tables: {}/{}", result.tables_loaded, result.tables_total),
            format!("  Rows: {}", result.rows_written),
            format!("  Script bytes: {}", result.bytes_written),
        ];
        if result.passthrough_types > 0 {
            lines.push(format!(
                "  Types copied verbatim: {} (search the script for REVIEW)",
                result.passthrough_types
            ));
        }
        lines.join("\n")
    };

    if script_on_stdout {
        writeln!(std::io::stderr(), "{}", text)?;
    } else {
        writeln!(std::io::stdout(), "{}", text)?;
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr; stdout may carry the script.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the run on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current row...", name);
                    token.cancel();
                }
                Err(e) => warn!("Failed to install {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Cancel the run on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Stopping after the current row...");
                token.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl-C handler: {}", e),
        }
    });

    cancel_token
}

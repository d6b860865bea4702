//! Sentiment shift CLI
//!
//! Terminal tooling around the detection engine:
//! - Replay already-scored chat messages through a stream monitor
//! - Export detected anomalies for one user and date range to CSV
//! - Inspect the effective configuration

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;

use commands::{export, replay};
pub use config::{CliConfig, ExportDefaults};
pub use error::{CliError, CliResult};
pub use output::OutputFormat;

/// Sentiment shift CLI application
#[derive(Parser)]
#[command(name = "sentiment-shift")]
#[command(about = "Detect abrupt per-user sentiment shifts in chat streams", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SENTIMENT_SHIFT_CONFIG")]
    config: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Replay scored messages and report the anomalies
    Replay(replay::ReplayArgs),

    /// Export anomalies to CSV with per-method counts
    Export(export::ExportArgs),

    /// Show the effective configuration
    Config,
}

/// Run using the current process arguments.
pub fn run() -> CliResult<()> {
    run_with_args(std::env::args_os())
}

/// Run using the provided argument iterator.
pub fn run_with_args<I, T>(args: I) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    // Initialize tracing; stdout is reserved for command output.
    let filter = if cli.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init();

    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay(args) => replay::execute(args, &config.monitor, cli.output),
        Commands::Export(args) => export::execute(args, &config.export, cli.output),
        Commands::Config => show_config(&config, cli.config.as_deref(), cli.output),
    }
}

/// Print a top-level error the way commands print failures.
pub fn report_error(error: &CliError) {
    output::status(output::Status::Failed, error);
}

fn show_config(config: &CliConfig, path: Option<&str>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Table => {
            let source = match path {
                Some(p) => p.to_string(),
                None => CliConfig::default_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(defaults)".into()),
            };
            println!("# source: {}", source);
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        _ => output::print_document(config, format),
    }
}

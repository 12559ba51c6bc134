//! Testdrive CLI - Main Entry Point
//!
//! Resolves a `testdrive.yaml` configuration and serves the resulting
//! files to browsers under test.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use testdrive_cli::commands::{files, serve};
use testdrive_cli::output;

/// Testdrive - browser JavaScript test harness
#[derive(Parser)]
#[command(name = "testdrive")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "TESTDRIVE_CONFIG", default_value = testdrive_common::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the configuration and serve it to browsers
    Serve(serve::ServeArgs),

    /// Print the resolved load, serve and test files
    Files(files::FilesArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let result = match cli.command {
        Commands::Serve(args) => serve::execute(args, &cli.config).await,
        Commands::Files(args) => files::execute(args, &cli.config, cli.format),
        Commands::Version => {
            println!("Testdrive v{}", testdrive_common::VERSION);
            Ok(())
        }
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

//! spectree CLI - Main Entry Point
//!
//! Hosts and inspects the parallel synchronizer that sharded spectree
//! workers report to, and vets run configurations before workers start.

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{aggregate, serve, status, vet};

/// spectree - spec-tree test execution engine
#[derive(Parser)]
#[command(name = "spectree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host the parallel synchronizer
    Serve(serve::ServeArgs),

    /// Check that a synchronizer is up
    Status(status::StatusArgs),

    /// Wait for every worker and print the aggregate outcome
    Aggregate(aggregate::AggregateArgs),

    /// Validate a run configuration
    Vet(vet::VetArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let ok = match cli.command {
        Commands::Serve(args) => {
            serve::execute(args).await?;
            true
        }
        Commands::Status(args) => status::execute(args, cli.format).await?,
        Commands::Aggregate(args) => aggregate::execute(args, cli.format).await?,
        Commands::Vet(args) => vet::execute(args, cli.format).await?,
        Commands::Version => {
            println!("spectree v{}", spectree_common::VERSION);
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

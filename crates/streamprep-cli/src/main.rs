mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "streamprep",
    version,
    about = "Declarative record transformation pipelines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level for streamprep crates, or a directive list (RUST_LOG overrides)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and run every pipeline in a file until interrupted
    Run {
        /// Path to pipelines YAML file
        pipelines: PathBuf,
        /// Time each pipeline is given to drain on shutdown
        #[arg(long, default_value_t = 5_000)]
        shutdown_timeout_ms: u64,
    },
    /// Build every pipeline in a file without running it
    Check {
        /// Path to pipelines YAML file
        pipelines: PathBuf,
    },
    /// List registered plugin type-names
    Plugins,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level)?;

    match cli.command {
        Commands::Run {
            pipelines,
            shutdown_timeout_ms,
        } => commands::run::execute(&pipelines, shutdown_timeout_ms).await,
        Commands::Check { pipelines } => commands::check::execute(&pipelines),
        Commands::Plugins => commands::plugins::execute(),
    }
}

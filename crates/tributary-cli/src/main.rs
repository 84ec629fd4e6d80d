mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tributary",
    version,
    about = "Fetch, archive, clean and load API datasets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dataset pipeline once
    Run {
        /// Path to run YAML file
        config: PathBuf,
        /// Fetch and transform only; print cleaned records to stdout
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a run file and its dataset descriptor
    Check {
        /// Path to run YAML file
        config: PathBuf,
    },
    /// List built-in dataset presets
    Datasets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { config, dry_run } => commands::run::execute(&config, dry_run).await,
        Commands::Check { config } => commands::check::execute(&config),
        Commands::Datasets => commands::datasets::execute(),
    }
}

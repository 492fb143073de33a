//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod ask;
mod check;
mod repl;
mod schema;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use vidstats::{Config, StatsService};

#[derive(Parser)]
#[command(name = "vidstats")]
#[command(about = "Answer questions about video statistics with a single number")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question and print the answer
    Ask {
        /// The question, in natural language
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Answer questions read line by line from stdin
    Repl,

    /// Connect to the database and verify credentials
    Check,

    /// Print the schema contract sent to the language model
    Schema {
        /// Print only version and fingerprint
        #[arg(long)]
        short: bool,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Schema { short } => schema::cmd_schema(short),
        Commands::Ask { question } => {
            let service = load_service(cli.config).await?;
            ask::cmd_ask(&service, &question.join(" ")).await
        }
        Commands::Repl => {
            let service = load_service(cli.config).await?;
            repl::cmd_repl(service).await
        }
        Commands::Check => {
            let service = load_service(cli.config).await?;
            check::cmd_check(&service).await
        }
    }
}

async fn load_service(config_path: Option<PathBuf>) -> anyhow::Result<Arc<StatsService>> {
    let config = Config::load(config_path.as_deref()).await?;
    if let Some(path) = &config.source_path {
        tracing::info!("Loaded config from {}", path.display());
    }
    Ok(Arc::new(StatsService::from_config(&config)?))
}

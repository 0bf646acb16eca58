//! ContextRank CLI — the main entry point.
//!
//! Commands:
//! - `replay`  — Run a JSONL transcript through the store and show the ranking
//! - `config`  — Show, validate or initialize configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use contextrank_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod transcript;

#[derive(Parser)]
#[command(
    name = "contextrank",
    about = "ContextRank — conversation context prioritization",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.contextrank/config.toml
    #[arg(long, global = true, env = "CONTEXTRANK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a transcript and print the priority ordering
    Replay {
        /// JSONL transcript, one operation per line
        file: PathBuf,

        /// Project the transcript belongs to
        #[arg(short, long, default_value = "default")]
        project: String,

        /// Override the window token budget
        #[arg(short, long)]
        budget: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Check the configuration for errors
    Validate,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = commands::load_config(cli.config.as_deref());
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(cli.verbose, &logging);

    match cli.command {
        Commands::Replay {
            file,
            project,
            budget,
            json,
        } => {
            let opts = commands::replay::ReplayOptions {
                file,
                project,
                budget,
                json,
            };
            commands::replay::run(&loaded?, opts).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&loaded?)?,
            ConfigAction::Validate => commands::config_cmd::validate(loaded)?,
            ConfigAction::Path => commands::config_cmd::path(cli.config.as_deref()),
            ConfigAction::Init { force } => commands::config_cmd::init(force)?,
        },
    }

    Ok(())
}

/// Logs go to stderr so that stdout stays machine-readable.
fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let fallback = if verbose { "debug" } else { logging.filter.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

//! TaxMate CLI: the main entry point.
//!
//! Commands:
//! - `serve`  : Start the HTTP gateway
//! - `run`    : Run one invoice through a pipeline variant and print the ledger
//! - `config` : Print the default config, its path, or validate the current one

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taxmate_core::{ActorRole, Variant};

mod commands;

use commands::run::DecisionArg;

#[derive(Parser)]
#[command(
    name = "taxmate",
    about = "TaxMate, a governance pipeline for an accounts-payable agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run an invoice through one pipeline variant
    Run {
        /// ungoverned, judgment, or approval (aliases: vulnerable, secure, hitl)
        #[arg(long, default_value = "ungoverned")]
        variant: Variant,

        /// ADMIN or READ_ONLY
        #[arg(long, default_value = "ADMIN")]
        role: ActorRole,

        /// Invoice text file; the built-in poisoned sample when omitted
        #[arg(long)]
        invoice: Option<PathBuf>,

        /// Resolve an approval suspension in the same invocation
        #[arg(long, value_enum)]
        decision: Option<DecisionArg>,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default config file (the default action)
    Default,
    /// Print the config file path
    Path,
    /// Load and validate the current config
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Run {
            variant,
            role,
            invoice,
            decision,
        } => commands::run::run(variant, role, invoice, decision).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Default) {
            ConfigAction::Default => commands::config_cmd::print_default(),
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
    }

    Ok(())
}

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use purchases::cli::setup;
use purchases::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for purchases::AppCommand {
    fn from(cmd: Commands) -> purchases::AppCommand {
        match cmd {
            Commands::Transactions { file, json } => {
                purchases::AppCommand::Transactions { path: file, json }
            }
            Commands::Receipt { file, json } => purchases::AppCommand::Receipt { path: file, json },
            Commands::Eligibility {
                receipt,
                product_ids,
                json,
            } => purchases::AppCommand::Eligibility {
                receipt_path: receipt,
                product_identifiers: product_ids,
                json,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// List non-subscription transactions from a subscriber JSON document
    Transactions {
        /// JSON file with the non_subscriptions map or a full subscriber response
        file: PathBuf,
        /// Print transactions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode an App Store receipt
    Receipt {
        /// Receipt file, base64 text or raw bytes
        file: PathBuf,
        /// Print the receipt as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check free trial and introductory offer eligibility
    Eligibility {
        /// Receipt file, base64 text or raw bytes
        #[arg(short, long)]
        receipt: PathBuf,
        /// Product identifiers to check
        #[arg(required = true)]
        product_ids: Vec<String>,
        /// Print statuses as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => setup::setup_at_path(path),
            None => setup::setup(),
        },
        Some(cmd) => purchases::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

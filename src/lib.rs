pub mod cli;
pub mod core;
pub mod eligibility;
pub mod providers;
pub mod receipt;
pub mod transactions;

use crate::core::config::AppConfig;
use anyhow::Result;
use std::path::PathBuf;
use tracing::{debug, info};

pub enum AppCommand {
    Transactions {
        path: PathBuf,
        json: bool,
    },
    Receipt {
        path: PathBuf,
        json: bool,
    },
    Eligibility {
        receipt_path: PathBuf,
        product_identifiers: Vec<String>,
        json: bool,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("purchases starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load_or_default()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Transactions { path, json } => cli::transactions::run(&path, json, &config),
        AppCommand::Receipt { path, json } => cli::receipt::run(&path, json),
        AppCommand::Eligibility {
            receipt_path,
            product_identifiers,
            json,
        } => cli::eligibility::run(&receipt_path, &product_identifiers, json, &config).await,
    }
}

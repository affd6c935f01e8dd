use crate::core::date::{DateFormatter, ISO8601_PATTERN};
use crate::core::product::Product;
use anyhow::{Context, Result};
use chrono::FixedOffset;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

/// Output order of the transactions factory.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOrder {
    /// Oldest purchase first; ties by product then transaction identifier.
    #[default]
    PurchaseDate,
    /// Grouped by product identifier, oldest purchase first within a product.
    ProductIdentifier,
    /// Keys in sorted order, records in array order.
    Input,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TransactionsConfig {
    #[serde(default)]
    pub order: TransactionOrder,
    #[serde(default = "default_deduplicate")]
    pub deduplicate: bool,
}

fn default_deduplicate() -> bool {
    true
}

impl Default for TransactionsConfig {
    fn default() -> Self {
        TransactionsConfig {
            order: TransactionOrder::default(),
            deduplicate: default_deduplicate(),
        }
    }
}

fn default_date_format() -> String {
    ISO8601_PATTERN.to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub time_zone_offset_seconds: i32,
    #[serde(default)]
    pub transactions: TransactionsConfig,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            date_format: default_date_format(),
            time_zone_offset_seconds: 0,
            transactions: TransactionsConfig::default(),
            products: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads the default config file when present, defaults otherwise.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "purchases", "purchases")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Builds the date formatter described by `date_format` and `time_zone_offset_seconds`.
    pub fn date_formatter(&self) -> Result<DateFormatter> {
        let time_zone = FixedOffset::east_opt(self.time_zone_offset_seconds).with_context(|| {
            format!(
                "Invalid time zone offset: {} seconds",
                self.time_zone_offset_seconds
            )
        })?;
        let formatter = DateFormatter::new(&self.date_format)
            .with_context(|| format!("Invalid date format: {}", self.date_format))?;
        Ok(formatter.with_time_zone(time_zone))
    }
}

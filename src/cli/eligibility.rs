use super::receipt::read_receipt_file;
use super::ui;
use crate::core::config::AppConfig;
use crate::eligibility::{IntroEligibilityCalculator, IntroEligibilityStatus};
use crate::providers::{CatalogProductsProvider, ProductsManager};
use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

pub async fn run(
    receipt_path: &Path,
    product_identifiers: &[String],
    json: bool,
    config: &AppConfig,
) -> Result<()> {
    let receipt_data = read_receipt_file(receipt_path)?;
    let provider = ProductsManager::new(CatalogProductsProvider::new(config.products.clone()));
    let calculator = IntroEligibilityCalculator::new(provider);

    let candidates: HashSet<String> = product_identifiers.iter().cloned().collect();
    let result = calculator
        .check_trial_or_introductory_price_eligibility(&receipt_data, &candidates)
        .await
        .with_context(|| format!("Failed to read receipt: {}", receipt_path.display()))?;

    debug!(counts = ?summarize(&result), "Computed eligibility");
    let sorted: BTreeMap<String, IntroEligibilityStatus> = result.into_iter().collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&sorted)?);
        return Ok(());
    }

    if sorted.is_empty() {
        println!("No products to check.");
        return Ok(());
    }
    println!(
        "\n{}",
        ui::style_text("Intro offer eligibility", ui::StyleType::Title)
    );
    println!("{}", eligibility_table(&sorted));
    Ok(())
}

fn status_cell(status: IntroEligibilityStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        IntroEligibilityStatus::Eligible => cell.fg(Color::Green),
        IntroEligibilityStatus::Ineligible => cell.fg(Color::Red),
        IntroEligibilityStatus::Unknown => cell.fg(Color::DarkGrey),
    }
}

fn eligibility_table(result: &BTreeMap<String, IntroEligibilityStatus>) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Product"),
        ui::header_cell("Status"),
        ui::header_cell("Code"),
    ]);
    for (product_identifier, status) in result {
        table.add_row(vec![
            Cell::new(product_identifier),
            status_cell(*status),
            ui::number_cell(status.as_number()),
        ]);
    }
    table
}

/// Counts per status.
fn summarize(result: &HashMap<String, IntroEligibilityStatus>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for status in result.values() {
        *counts.entry(status.to_string()).or_insert(0) += 1;
    }
    counts
}

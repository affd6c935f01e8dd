use super::ui;
use crate::core::DateFormatter;
use crate::core::config::AppConfig;
use crate::transactions::{SkipReason, TransactionBatch, TransactionsFactory, from_json_str};
use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use std::path::Path;
use tracing::warn;

pub fn run(path: &Path, json: bool, config: &AppConfig) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read purchases file: {}", path.display()))?;
    let date_formatter = config.date_formatter()?;
    let factory = TransactionsFactory::new(config.transactions.clone());
    let batch = from_json_str(&factory, &contents, &date_formatter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&batch.transactions)?);
        return Ok(());
    }

    if batch.transactions.is_empty() {
        println!("No non-subscription transactions found.");
    } else {
        println!(
            "\n{}",
            ui::style_text("Non-subscription transactions", ui::StyleType::Title)
        );
        println!("{}", transactions_table(&batch, &date_formatter));
    }

    let unparsable_dates = batch
        .skipped
        .iter()
        .filter(|entry| matches!(entry.reason, SkipReason::UnparsableDate(_)))
        .count();
    if unparsable_dates > 0 {
        warn!(
            "{unparsable_dates} purchase dates did not match the date_format '{}'",
            date_formatter.pattern()
        );
    }

    if !batch.skipped.is_empty() {
        println!(
            "\n{}",
            ui::style_text(
                &format!("Skipped {} entries", batch.skipped.len()),
                ui::StyleType::Error
            )
        );
        println!("{}", skipped_table(&batch));
    }
    Ok(())
}

fn transactions_table(batch: &TransactionBatch, date_formatter: &DateFormatter) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Product"),
        ui::header_cell("Transaction"),
        ui::header_cell("Purchase Date"),
        ui::header_cell("Store"),
        ui::header_cell("Sandbox"),
    ]);

    for transaction in &batch.transactions {
        table.add_row(vec![
            Cell::new(&transaction.product_identifier),
            Cell::new(&transaction.transaction_identifier),
            Cell::new(date_formatter.format(&transaction.purchase_date)),
            ui::format_optional_cell(transaction.store.as_deref(), str::to_string),
            Cell::new(if transaction.is_sandbox { "yes" } else { "no" }),
        ]);
    }

    table.add_row(vec![
        Cell::new(ui::style_text("Total", ui::StyleType::TotalLabel)),
        ui::number_cell(batch.transactions.len()),
    ]);
    table
}

fn skipped_table(batch: &TransactionBatch) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Product"),
        ui::header_cell("Index"),
        ui::header_cell("Reason"),
    ]);
    for entry in &batch.skipped {
        table.add_row(vec![
            Cell::new(&entry.product_identifier),
            ui::format_optional_cell(entry.index, |i| i.to_string()),
            Cell::new(entry.reason.to_string()),
        ]);
    }
    table
}

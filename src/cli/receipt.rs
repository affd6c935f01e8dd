use super::ui;
use crate::core::DateFormatter;
use crate::receipt::{AppleReceipt, ReceiptParser};
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use comfy_table::{Cell, Table};
use std::path::Path;
use tracing::debug;

/// Reads receipt bytes from a file holding either base64 text or raw DER.
pub fn read_receipt_file(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read receipt file: {}", path.display()))?;
    Ok(decode_receipt(bytes))
}

fn decode_receipt(bytes: Vec<u8>) -> Vec<u8> {
    let decoded = std::str::from_utf8(&bytes).ok().and_then(|text| {
        let compact: String = text.split_whitespace().collect();
        STANDARD.decode(compact).ok()
    });
    match decoded {
        Some(decoded) if !decoded.is_empty() => {
            debug!("Decoded base64 receipt of {} bytes", decoded.len());
            decoded
        }
        _ => bytes,
    }
}

pub fn run(path: &Path, json: bool) -> Result<()> {
    let data = read_receipt_file(path)?;
    let receipt = ReceiptParser::new()
        .parse(&data)
        .with_context(|| format!("Failed to parse receipt: {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
        return Ok(());
    }

    let date_formatter = DateFormatter::iso8601();
    println!("\n{}", ui::style_text("Receipt", ui::StyleType::Title));
    println!("{}", receipt_table(&receipt, &date_formatter));

    if receipt.in_app_purchases.is_empty() {
        println!("No in-app purchases in receipt.");
    } else {
        println!(
            "\n{}",
            ui::style_text("In-app purchases", ui::StyleType::Title)
        );
        println!("{}", purchases_table(&receipt, &date_formatter));
    }
    Ok(())
}

fn receipt_table(receipt: &AppleReceipt, date_formatter: &DateFormatter) -> Table {
    let mut table = ui::new_styled_table();
    table.add_row(vec![ui::header_cell("Bundle"), Cell::new(&receipt.bundle_id)]);
    table.add_row(vec![
        ui::header_cell("Version"),
        Cell::new(&receipt.application_version),
    ]);
    table.add_row(vec![
        ui::header_cell("Original Version"),
        ui::format_optional_cell(receipt.original_application_version.as_deref(), str::to_string),
    ]);
    table.add_row(vec![
        ui::header_cell("Created"),
        Cell::new(date_formatter.format(&receipt.creation_date)),
    ]);
    table.add_row(vec![
        ui::header_cell("Expires"),
        ui::format_optional_cell(receipt.expiration_date.as_ref(), |d| {
            date_formatter.format(d)
        }),
    ]);
    table
}

fn purchases_table(receipt: &AppleReceipt, date_formatter: &DateFormatter) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Product"),
        ui::header_cell("Transaction"),
        ui::header_cell("Qty"),
        ui::header_cell("Purchased"),
        ui::header_cell("Expires"),
        ui::header_cell("Intro"),
    ]);
    for purchase in &receipt.in_app_purchases {
        table.add_row(vec![
            Cell::new(&purchase.product_id),
            Cell::new(&purchase.transaction_id),
            ui::number_cell(purchase.quantity),
            Cell::new(date_formatter.format(&purchase.purchase_date)),
            ui::format_optional_cell(purchase.expires_date.as_ref(), |d| {
                date_formatter.format(d)
            }),
            Cell::new(if purchase.used_intro_offer_or_free_trial() {
                "yes"
            } else {
                "no"
            }),
        ]);
    }
    table
}

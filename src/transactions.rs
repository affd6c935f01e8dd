//! Builds [`Transaction`] values out of the `non_subscriptions` section of a
//! subscriber payload.
//!
//! The payload maps product identifiers to purchase records:
//!
//! ```json
//! {
//!   "com.example.coins": [
//!     { "id": "72c26cc69c", "purchase_date": "2020-08-05T10:00:00Z", "store": "app_store" }
//!   ]
//! }
//! ```
//!
//! A key may also map to a single record object. Records that cannot be read
//! are skipped, never fatal; [`TransactionsFactory::build`] reports them.

use crate::core::config::{TransactionOrder, TransactionsConfig};
use crate::core::{DateParser, Transaction};
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt::Display;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct NonSubscriptionRecord {
    id: String,
    purchase_date: String,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    store: Option<String>,
    #[serde(default)]
    is_sandbox: bool,
}

/// Why an entry of the payload did not produce a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The value is neither a record object nor an array of records.
    NotARecord,
    /// A required field is missing or has the wrong type.
    MalformedRecord(String),
    /// The date formatter could not read `purchase_date`.
    UnparsableDate(String),
    /// Another record with the same transaction identifier was kept.
    DuplicateTransaction(String),
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotARecord => write!(f, "not a purchase record"),
            SkipReason::MalformedRecord(e) => write!(f, "malformed record: {e}"),
            SkipReason::UnparsableDate(d) => write!(f, "unparsable purchase date '{d}'"),
            SkipReason::DuplicateTransaction(id) => write!(f, "duplicate transaction '{id}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Key of the entry in the payload.
    pub product_identifier: String,
    /// Position in the record array; `None` when the key maps to a single value.
    pub index: Option<usize>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionBatch {
    pub transactions: Vec<Transaction>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionsFactory {
    options: TransactionsConfig,
}

impl TransactionsFactory {
    pub fn new(options: TransactionsConfig) -> Self {
        Self { options }
    }

    pub fn non_subscription_transactions(
        &self,
        subscriptions_data: &Map<String, Value>,
        date_formatter: &dyn DateParser,
    ) -> Vec<Transaction> {
        self.build(subscriptions_data, date_formatter).transactions
    }

    /// Same as [`Self::non_subscription_transactions`], also returning the
    /// entries that were left out.
    pub fn build(
        &self,
        subscriptions_data: &Map<String, Value>,
        date_formatter: &dyn DateParser,
    ) -> TransactionBatch {
        let mut batch = TransactionBatch::default();
        let mut collected: Vec<CollectedTransaction> = Vec::new();

        // Sorted keys, whatever serde_json's preserve_order setting.
        let mut entries: Vec<(&String, &Value)> = subscriptions_data.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        for (product_identifier, value) in entries {
            let records: Vec<(Option<usize>, &Value)> = match value {
                Value::Array(records) => records
                    .iter()
                    .enumerate()
                    .map(|(index, record)| (Some(index), record))
                    .collect(),
                Value::Object(_) => vec![(None, value)],
                _ => {
                    skip(&mut batch, product_identifier, None, SkipReason::NotARecord);
                    continue;
                }
            };

            for (index, record) in records {
                match read_record(product_identifier, record, date_formatter) {
                    Ok(transaction) => collected.push(CollectedTransaction {
                        transaction,
                        source_key: product_identifier,
                        index,
                    }),
                    Err(reason) => skip(&mut batch, product_identifier, index, reason),
                }
            }
        }

        self.sort(&mut collected);

        let mut seen = HashSet::new();
        for entry in collected {
            let first = seen.insert(entry.transaction.transaction_identifier.clone());
            if self.options.deduplicate && !first {
                skip(
                    &mut batch,
                    entry.source_key,
                    entry.index,
                    SkipReason::DuplicateTransaction(entry.transaction.transaction_identifier),
                );
            } else {
                batch.transactions.push(entry.transaction);
            }
        }

        debug!(
            "Built {} transactions, skipped {} entries",
            batch.transactions.len(),
            batch.skipped.len()
        );
        batch
    }

    fn sort(&self, collected: &mut [CollectedTransaction<'_>]) {
        match self.options.order {
            TransactionOrder::PurchaseDate => collected.sort_by(|a, b| {
                let (a, b) = (&a.transaction, &b.transaction);
                a.purchase_date
                    .cmp(&b.purchase_date)
                    .then_with(|| a.product_identifier.cmp(&b.product_identifier))
                    .then_with(|| a.transaction_identifier.cmp(&b.transaction_identifier))
            }),
            TransactionOrder::ProductIdentifier => collected.sort_by(|a, b| {
                let (a, b) = (&a.transaction, &b.transaction);
                a.product_identifier
                    .cmp(&b.product_identifier)
                    .then_with(|| a.purchase_date.cmp(&b.purchase_date))
                    .then_with(|| a.transaction_identifier.cmp(&b.transaction_identifier))
            }),
            TransactionOrder::Input => {}
        }
    }
}

/// A transaction along with where it was read from.
struct CollectedTransaction<'a> {
    transaction: Transaction,
    source_key: &'a str,
    index: Option<usize>,
}

fn read_record(
    product_identifier: &str,
    value: &Value,
    date_formatter: &dyn DateParser,
) -> Result<Transaction, SkipReason> {
    if !value.is_object() {
        return Err(SkipReason::NotARecord);
    }

    let record = NonSubscriptionRecord::deserialize(value)
        .map_err(|e| SkipReason::MalformedRecord(e.to_string()))?;

    let purchase_date = date_formatter
        .parse(&record.purchase_date)
        .ok_or_else(|| SkipReason::UnparsableDate(record.purchase_date.clone()))?;

    let mut transaction = Transaction::new(
        record.id,
        record
            .product_id
            .unwrap_or_else(|| product_identifier.to_string()),
        purchase_date,
    );
    transaction.store = record.store;
    transaction.is_sandbox = record.is_sandbox;
    Ok(transaction)
}

fn skip(
    batch: &mut TransactionBatch,
    product_identifier: &str,
    index: Option<usize>,
    reason: SkipReason,
) {
    warn!(
        product = product_identifier,
        ?index,
        "Skipping purchase record: {reason}"
    );
    batch.skipped.push(SkippedEntry {
        product_identifier: product_identifier.to_string(),
        index,
        reason,
    });
}

/// Reads a JSON document holding non-subscription purchases and builds the batch.
///
/// Accepts either the product map itself or a full subscriber response, in
/// which case `subscriber.non_subscriptions` is used.
pub fn from_json_str(
    factory: &TransactionsFactory,
    json: &str,
    date_formatter: &dyn DateParser,
) -> Result<TransactionBatch> {
    let document: Value = serde_json::from_str(json).context("Failed to parse JSON document")?;

    let data = match document.pointer("/subscriber/non_subscriptions") {
        Some(section) => section,
        None => &document,
    };

    let map = data
        .as_object()
        .ok_or_else(|| anyhow!("Expected a JSON object of non-subscription purchases"))?;

    Ok(factory.build(map, date_formatter))
}

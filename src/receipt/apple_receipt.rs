use crate::core::Transaction;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Display;

pub const APP_STORE: &str = "app_store";

/// Receipt-level attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptAttributeType {
    BundleId = 2,
    ApplicationVersion = 3,
    OpaqueValue = 4,
    Sha1Hash = 5,
    CreationDate = 12,
    InAppPurchase = 17,
    OriginalApplicationVersion = 19,
    ExpirationDate = 21,
}

impl ReceiptAttributeType {
    pub fn from_raw(value: u64) -> Option<Self> {
        use ReceiptAttributeType::*;
        [
            BundleId,
            ApplicationVersion,
            OpaqueValue,
            Sha1Hash,
            CreationDate,
            InAppPurchase,
            OriginalApplicationVersion,
            ExpirationDate,
        ]
        .into_iter()
        .find(|attribute| *attribute as u64 == value)
    }
}

/// In-app purchase attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InAppPurchaseAttributeType {
    Quantity = 1701,
    ProductId = 1702,
    TransactionId = 1703,
    PurchaseDate = 1704,
    OriginalTransactionId = 1705,
    OriginalPurchaseDate = 1706,
    ExpiresDate = 1708,
    WebOrderLineItemId = 1711,
    CancellationDate = 1712,
    IsInTrialPeriod = 1713,
    IsInIntroOfferPeriod = 1719,
    PromotionalOfferIdentifier = 1721,
}

impl InAppPurchaseAttributeType {
    pub fn from_raw(value: u64) -> Option<Self> {
        use InAppPurchaseAttributeType::*;
        [
            Quantity,
            ProductId,
            TransactionId,
            PurchaseDate,
            OriginalTransactionId,
            OriginalPurchaseDate,
            ExpiresDate,
            WebOrderLineItemId,
            CancellationDate,
            IsInTrialPeriod,
            IsInIntroOfferPeriod,
            PromotionalOfferIdentifier,
        ]
        .into_iter()
        .find(|attribute| *attribute as u64 == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InAppPurchase {
    pub quantity: u64,
    pub product_id: String,
    pub transaction_id: String,
    pub original_transaction_id: Option<String>,
    pub purchase_date: DateTime<Utc>,
    pub original_purchase_date: Option<DateTime<Utc>>,
    pub expires_date: Option<DateTime<Utc>>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub is_in_trial_period: Option<bool>,
    pub is_in_intro_offer_period: Option<bool>,
    pub web_order_line_item_id: Option<u64>,
    pub promotional_offer_identifier: Option<String>,
}

impl InAppPurchase {
    pub fn used_intro_offer_or_free_trial(&self) -> bool {
        self.is_in_trial_period.unwrap_or(false) || self.is_in_intro_offer_period.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppleReceipt {
    pub bundle_id: String,
    pub application_version: String,
    pub original_application_version: Option<String>,
    pub opaque_value: Vec<u8>,
    pub sha1_hash: Vec<u8>,
    pub creation_date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub in_app_purchases: Vec<InAppPurchase>,
}

impl AppleReceipt {
    pub fn purchased_intro_offer_or_free_trial_product_identifiers(&self) -> HashSet<String> {
        self.in_app_purchases
            .iter()
            .filter(|purchase| purchase.used_intro_offer_or_free_trial())
            .map(|purchase| purchase.product_id.clone())
            .collect()
    }

    /// Purchases without an expiration date, oldest first.
    pub fn non_subscription_transactions(&self) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self
            .in_app_purchases
            .iter()
            .filter(|purchase| purchase.expires_date.is_none())
            .map(|purchase| Transaction {
                transaction_identifier: purchase.transaction_id.clone(),
                product_identifier: purchase.product_id.clone(),
                purchase_date: purchase.purchase_date,
                store: Some(APP_STORE.to_string()),
                is_sandbox: false,
            })
            .collect();
        transactions.sort_by(|a, b| {
            a.purchase_date
                .cmp(&b.purchase_date)
                .then_with(|| a.transaction_identifier.cmp(&b.transaction_identifier))
        });
        transactions
    }
}

impl Display for AppleReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} (created {}, {} in-app purchases)",
            self.bundle_id,
            self.application_version,
            self.creation_date.to_rfc3339(),
            self.in_app_purchases.len()
        )
    }
}

//! Transaction value object

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One purchase event that is not part of a renewing subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_identifier: String,
    pub product_identifier: String,
    pub purchase_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(default)]
    pub is_sandbox: bool,
}

impl Transaction {
    pub fn new(
        transaction_identifier: impl Into<String>,
        product_identifier: impl Into<String>,
        purchase_date: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_identifier: transaction_identifier.into(),
            product_identifier: product_identifier.into(),
            purchase_date,
            store: None,
            is_sandbox: false,
        }
    }
}

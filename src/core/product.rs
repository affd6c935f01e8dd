//! Product catalog abstractions

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Product {
    pub product_identifier: String,
    #[serde(default)]
    pub subscription_group_identifier: Option<String>,
}

impl Product {
    pub fn new(product_identifier: impl Into<String>) -> Self {
        Self {
            product_identifier: product_identifier.into(),
            subscription_group_identifier: None,
        }
    }

    pub fn with_subscription_group(mut self, group: impl Into<String>) -> Self {
        self.subscription_group_identifier = Some(group.into());
        self
    }
}

/// Looks up product details by identifier.
///
/// Identifiers the provider does not know about are left out of the result.
#[async_trait]
pub trait ProductsProvider: Send + Sync {
    async fn products(&self, identifiers: &HashSet<String>) -> Result<Vec<Product>>;
}

use crate::core::{Product, ProductsProvider};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Serves products from a fixed catalog, typically the `products` section of the config.
pub struct CatalogProductsProvider {
    products: HashMap<String, Product>,
}

impl CatalogProductsProvider {
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|p| (p.product_identifier.clone(), p))
                .collect(),
        }
    }
}

#[async_trait]
impl ProductsProvider for CatalogProductsProvider {
    async fn products(&self, identifiers: &HashSet<String>) -> Result<Vec<Product>> {
        let found: Vec<Product> = identifiers
            .iter()
            .filter_map(|id| self.products.get(id).cloned())
            .collect();
        debug!(
            "Catalog has {} of {} requested products",
            found.len(),
            identifiers.len()
        );
        Ok(found)
    }
}

use crate::core::{Product, ProductsProvider};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Caches products from an inner provider.
///
/// The cache lock is held while the inner provider is queried, so concurrent
/// callers wait for an in-flight request instead of repeating it.
#[derive(Clone)]
pub struct ProductsManager<T: ProductsProvider> {
    inner: T,
    cache: Arc<Mutex<HashMap<String, Product>>>,
}

impl<T: ProductsProvider> ProductsManager<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl<T: ProductsProvider> ProductsProvider for ProductsManager<T> {
    async fn products(&self, identifiers: &HashSet<String>) -> Result<Vec<Product>> {
        let mut cache = self.cache.lock().await;

        let missing: HashSet<String> = identifiers
            .iter()
            .filter(|id| !cache.contains_key(*id))
            .cloned()
            .collect();

        if missing.is_empty() {
            debug!("Cache hit for {} products", identifiers.len());
        } else {
            debug!("Cache miss for products: {:?}", missing);
            for product in self.inner.products(&missing).await? {
                cache.insert(product.product_identifier.clone(), product);
            }
        }

        Ok(identifiers
            .iter()
            .filter_map(|id| cache.get(id).cloned())
            .collect())
    }
}

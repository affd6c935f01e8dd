//! Free trial and introductory price eligibility, computed from the local receipt.

use crate::core::{Product, ProductsProvider};
use crate::receipt::{ReceiptParser, ReceiptReadError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntroEligibilityStatus {
    Unknown = 0,
    Ineligible = 1,
    Eligible = 2,
}

impl IntroEligibilityStatus {
    pub fn as_number(&self) -> u8 {
        *self as u8
    }
}

impl Display for IntroEligibilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                IntroEligibilityStatus::Unknown => "unknown",
                IntroEligibilityStatus::Ineligible => "ineligible",
                IntroEligibilityStatus::Eligible => "eligible",
            }
        )
    }
}

pub struct IntroEligibilityCalculator<P: ProductsProvider> {
    products_provider: P,
    receipt_parser: ReceiptParser,
}

impl<P: ProductsProvider> IntroEligibilityCalculator<P> {
    pub fn new(products_provider: P) -> Self {
        Self::with_receipt_parser(products_provider, ReceiptParser::new())
    }

    pub fn with_receipt_parser(products_provider: P, receipt_parser: ReceiptParser) -> Self {
        Self {
            products_provider,
            receipt_parser,
        }
    }

    pub async fn check_trial_or_introductory_price_eligibility(
        &self,
        receipt_data: &[u8],
        candidate_product_identifiers: &HashSet<String>,
    ) -> Result<HashMap<String, IntroEligibilityStatus>, ReceiptReadError> {
        if candidate_product_identifiers.is_empty() {
            return Ok(HashMap::new());
        }

        let mut result: HashMap<String, IntroEligibilityStatus> = candidate_product_identifiers
            .iter()
            .map(|id| (id.clone(), IntroEligibilityStatus::Unknown))
            .collect();

        let receipt = self.receipt_parser.parse(receipt_data)?;
        let purchased_with_intro = receipt.purchased_intro_offer_or_free_trial_product_identifiers();
        debug!(
            "Receipt has {} products bought with an intro offer",
            purchased_with_intro.len()
        );

        let all_identifiers: HashSet<String> = candidate_product_identifiers
            .union(&purchased_with_intro)
            .cloned()
            .collect();

        let products = match self.products_provider.products(&all_identifiers).await {
            Ok(products) => products,
            Err(e) => {
                warn!("Could not fetch products, eligibility stays unknown: {e}");
                Vec::new()
            }
        };

        let purchased_products: Vec<&Product> = products
            .iter()
            .filter(|p| purchased_with_intro.contains(&p.product_identifier))
            .collect();
        let candidate_products = products
            .iter()
            .filter(|p| candidate_product_identifiers.contains(&p.product_identifier));

        result.extend(check_intro_eligibility(candidate_products, &purchased_products));
        Ok(result)
    }
}

fn check_intro_eligibility<'a>(
    candidates: impl Iterator<Item = &'a Product>,
    purchased_with_intro: &[&Product],
) -> HashMap<String, IntroEligibilityStatus> {
    candidates
        .map(|candidate| {
            let used_intro = purchased_with_intro.iter().any(|purchased| {
                let same_product = candidate.product_identifier == purchased.product_identifier;
                let same_group = candidate.subscription_group_identifier.is_some()
                    && candidate.subscription_group_identifier
                        == purchased.subscription_group_identifier;
                same_product || same_group
            });
            let status = if used_intro {
                IntroEligibilityStatus::Ineligible
            } else {
                IntroEligibilityStatus::Eligible
            };
            (candidate.product_identifier.clone(), status)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::test_support::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockProductsProvider {
        products: Vec<Product>,
        fail: bool,
        requests: Mutex<Vec<HashSet<String>>>,
    }

    impl MockProductsProvider {
        fn new(products: Vec<Product>) -> Self {
            Self {
                products,
                fail: false,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProductsProvider for MockProductsProvider {
        async fn products(&self, identifiers: &HashSet<String>) -> Result<Vec<Product>> {
            self.requests.lock().unwrap().push(identifiers.clone());
            if self.fail {
                return Err(anyhow!("store unavailable"));
            }
            Ok(self
                .products
                .iter()
                .filter(|p| identifiers.contains(&p.product_identifier))
                .cloned()
                .collect())
        }
    }

    fn receipt_with_trial_for(product_id: &str) -> Vec<u8> {
        pkcs7_receipt(&[
            receipt_string_attribute(2, "com.example.app"),
            receipt_string_attribute(3, "1.0"),
            receipt_attribute(4, &[0]),
            receipt_attribute(5, &[0]),
            receipt_string_attribute(12, "2020-08-05T10:00:00Z"),
            in_app_purchase(&[
                receipt_int_attribute(1701, 1),
                receipt_string_attribute(1702, product_id),
                receipt_string_attribute(1703, "1"),
                receipt_string_attribute(1704, "2020-08-01T10:00:00Z"),
                receipt_int_attribute(1713, 1),
            ]),
        ])
    }

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_no_candidates_returns_empty() {
        let provider = MockProductsProvider::new(vec![]);
        let calculator = IntroEligibilityCalculator::new(provider);

        let result = calculator
            .check_trial_or_introductory_price_eligibility(b"not a receipt", &HashSet::new())
            .await
            .unwrap();
        assert!(result.is_empty());
        assert!(calculator.products_provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_eligibility_by_product_and_group() {
        let provider = MockProductsProvider::new(vec![
            Product::new("monthly").with_subscription_group("premium"),
            Product::new("yearly").with_subscription_group("premium"),
            Product::new("pro_monthly").with_subscription_group("pro"),
            Product::new("coins"),
        ]);
        let calculator = IntroEligibilityCalculator::new(provider);

        let result = calculator
            .check_trial_or_introductory_price_eligibility(
                &receipt_with_trial_for("monthly"),
                &ids(&["monthly", "yearly", "pro_monthly", "coins", "not_in_store"]),
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 5);
        assert_eq!(result["monthly"], IntroEligibilityStatus::Ineligible);
        assert_eq!(result["yearly"], IntroEligibilityStatus::Ineligible);
        assert_eq!(result["pro_monthly"], IntroEligibilityStatus::Eligible);
        assert_eq!(result["coins"], IntroEligibilityStatus::Eligible);
        assert_eq!(result["not_in_store"], IntroEligibilityStatus::Unknown);

        let requests = calculator.products_provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("monthly"));
    }

    #[tokio::test]
    async fn test_products_without_group_only_match_by_identifier() {
        let provider = MockProductsProvider::new(vec![Product::new("lifetime"), Product::new("other")]);
        let calculator = IntroEligibilityCalculator::new(provider);

        let result = calculator
            .check_trial_or_introductory_price_eligibility(
                &receipt_with_trial_for("lifetime"),
                &ids(&["other"]),
            )
            .await
            .unwrap();
        assert_eq!(result["other"], IntroEligibilityStatus::Eligible);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_unknown() {
        let mut provider = MockProductsProvider::new(vec![Product::new("monthly")]);
        provider.fail = true;
        let calculator = IntroEligibilityCalculator::new(provider);

        let result = calculator
            .check_trial_or_introductory_price_eligibility(
                &receipt_with_trial_for("monthly"),
                &ids(&["monthly"]),
            )
            .await
            .unwrap();
        assert_eq!(result["monthly"], IntroEligibilityStatus::Unknown);
    }

    #[tokio::test]
    async fn test_invalid_receipt_is_an_error() {
        let calculator = IntroEligibilityCalculator::new(MockProductsProvider::new(vec![]));
        let result = calculator
            .check_trial_or_introductory_price_eligibility(&[0x30, 0x05], &ids(&["monthly"]))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_status_numbers() {
        assert_eq!(IntroEligibilityStatus::Unknown.as_number(), 0);
        assert_eq!(IntroEligibilityStatus::Ineligible.as_number(), 1);
        assert_eq!(IntroEligibilityStatus::Eligible.as_number(), 2);
    }
}

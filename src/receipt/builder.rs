//! Builds [`AppleReceipt`] values from decoded receipt containers.
//!
//! The receipt payload is a SET of attributes, each one a SEQUENCE of
//! `type INTEGER, version INTEGER, value OCTET STRING`. The value octets hold
//! another DER container with the typed value.

use super::ReceiptReadError;
use super::apple_receipt::{
    AppleReceipt, InAppPurchase, InAppPurchaseAttributeType, ReceiptAttributeType,
};
use super::asn1::{Asn1Container, Asn1Identifier, ContainerBuilder, EncodingType};
use crate::core::{DateFormatter, DateParser};
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ReceiptBuilder {
    container_builder: ContainerBuilder,
    date_formatter: DateFormatter,
}

impl Default for ReceiptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiptBuilder {
    pub fn new() -> Self {
        Self {
            container_builder: ContainerBuilder::new(),
            date_formatter: DateFormatter::iso8601(),
        }
    }

    /// Builds the receipt from the container that follows the `data` object identifier.
    pub fn build(&self, container: &Asn1Container<'_>) -> Result<AppleReceipt, ReceiptReadError> {
        let wrapper = container
            .internal_containers
            .first()
            .ok_or_else(|| parsing_error("receipt container is empty"))?;
        let payload = octet_string_content(wrapper);
        let attributes = self.container_builder.build(&payload)?;

        let mut bundle_id = None;
        let mut application_version = None;
        let mut original_application_version = None;
        let mut opaque_value = None;
        let mut sha1_hash = None;
        let mut creation_date = None;
        let mut expiration_date = None;
        let mut in_app_purchases = Vec::new();

        for attribute in &attributes.internal_containers {
            let (raw_type, value) = split_attribute(attribute)?;
            let Some(attribute_type) = ReceiptAttributeType::from_raw(raw_type) else {
                continue;
            };
            match attribute_type {
                ReceiptAttributeType::BundleId => bundle_id = Some(self.read_string(value)?),
                ReceiptAttributeType::ApplicationVersion => {
                    application_version = Some(self.read_string(value)?)
                }
                ReceiptAttributeType::OriginalApplicationVersion => {
                    original_application_version = Some(self.read_string(value)?)
                }
                ReceiptAttributeType::OpaqueValue => {
                    opaque_value = Some(value.internal_payload.to_vec())
                }
                ReceiptAttributeType::Sha1Hash => sha1_hash = Some(value.internal_payload.to_vec()),
                ReceiptAttributeType::CreationDate => creation_date = self.read_date(value)?,
                ReceiptAttributeType::ExpirationDate => expiration_date = self.read_date(value)?,
                ReceiptAttributeType::InAppPurchase => {
                    in_app_purchases.push(self.build_in_app_purchase(value)?)
                }
            }
        }

        debug!(
            "Built receipt with {} in-app purchases",
            in_app_purchases.len()
        );

        Ok(AppleReceipt {
            bundle_id: bundle_id.ok_or_else(|| missing("bundle id"))?,
            application_version: application_version
                .ok_or_else(|| missing("application version"))?,
            original_application_version,
            opaque_value: opaque_value.ok_or_else(|| missing("opaque value"))?,
            sha1_hash: sha1_hash.ok_or_else(|| missing("sha1 hash"))?,
            creation_date: creation_date.ok_or_else(|| missing("creation date"))?,
            expiration_date,
            in_app_purchases,
        })
    }

    fn build_in_app_purchase(
        &self,
        container: &Asn1Container<'_>,
    ) -> Result<InAppPurchase, ReceiptReadError> {
        let attributes = self.container_builder.build(container.internal_payload)?;

        let mut quantity = None;
        let mut product_id = None;
        let mut transaction_id = None;
        let mut original_transaction_id = None;
        let mut purchase_date = None;
        let mut original_purchase_date = None;
        let mut expires_date = None;
        let mut cancellation_date = None;
        let mut is_in_trial_period = None;
        let mut is_in_intro_offer_period = None;
        let mut web_order_line_item_id = None;
        let mut promotional_offer_identifier = None;

        for attribute in &attributes.internal_containers {
            let (raw_type, value) = split_attribute(attribute)?;
            let Some(attribute_type) = InAppPurchaseAttributeType::from_raw(raw_type) else {
                continue;
            };
            match attribute_type {
                InAppPurchaseAttributeType::Quantity => quantity = Some(self.read_uint(value)?),
                InAppPurchaseAttributeType::ProductId => {
                    product_id = Some(self.read_string(value)?)
                }
                InAppPurchaseAttributeType::TransactionId => {
                    transaction_id = Some(self.read_string(value)?)
                }
                InAppPurchaseAttributeType::OriginalTransactionId => {
                    original_transaction_id = Some(self.read_string(value)?)
                }
                InAppPurchaseAttributeType::PurchaseDate => purchase_date = self.read_date(value)?,
                InAppPurchaseAttributeType::OriginalPurchaseDate => {
                    original_purchase_date = self.read_date(value)?
                }
                InAppPurchaseAttributeType::ExpiresDate => expires_date = self.read_date(value)?,
                InAppPurchaseAttributeType::CancellationDate => {
                    cancellation_date = self.read_date(value)?
                }
                InAppPurchaseAttributeType::IsInTrialPeriod => {
                    is_in_trial_period = Some(self.read_uint(value)? != 0)
                }
                InAppPurchaseAttributeType::IsInIntroOfferPeriod => {
                    is_in_intro_offer_period = Some(self.read_uint(value)? != 0)
                }
                InAppPurchaseAttributeType::WebOrderLineItemId => {
                    web_order_line_item_id = Some(self.read_uint(value)?)
                }
                InAppPurchaseAttributeType::PromotionalOfferIdentifier => {
                    promotional_offer_identifier = Some(self.read_string(value)?)
                }
            }
        }

        Ok(InAppPurchase {
            quantity: quantity.ok_or_else(|| missing("in-app purchase quantity"))?,
            product_id: product_id.ok_or_else(|| missing("in-app purchase product id"))?,
            transaction_id: transaction_id
                .ok_or_else(|| missing("in-app purchase transaction id"))?,
            original_transaction_id,
            purchase_date: purchase_date.ok_or_else(|| missing("in-app purchase date"))?,
            original_purchase_date,
            expires_date,
            cancellation_date,
            is_in_trial_period,
            is_in_intro_offer_period,
            web_order_line_item_id,
            promotional_offer_identifier,
        })
    }

    fn typed_value<'a>(
        &self,
        container: &Asn1Container<'a>,
    ) -> Result<&'a [u8], ReceiptReadError> {
        Ok(self
            .container_builder
            .build(container.internal_payload)?
            .internal_payload)
    }

    fn read_string(&self, container: &Asn1Container<'_>) -> Result<String, ReceiptReadError> {
        let bytes = self.typed_value(container)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| parsing_error(&format!("attribute is not valid UTF-8: {e}")))
    }

    fn read_uint(&self, container: &Asn1Container<'_>) -> Result<u64, ReceiptReadError> {
        read_uint(self.typed_value(container)?)
    }

    /// Empty strings mark absent dates.
    fn read_date(
        &self,
        container: &Asn1Container<'_>,
    ) -> Result<Option<DateTime<Utc>>, ReceiptReadError> {
        let text = self.read_string(container)?;
        if text.is_empty() {
            return Ok(None);
        }
        self.date_formatter
            .parse(&text)
            .map(Some)
            .ok_or_else(|| parsing_error(&format!("invalid date '{text}'")))
    }
}

fn split_attribute<'c, 'a>(
    attribute: &'c Asn1Container<'a>,
) -> Result<(u64, &'c Asn1Container<'a>), ReceiptReadError> {
    match attribute.internal_containers.as_slice() {
        [type_container, _version, value, ..] => {
            Ok((read_uint(type_container.internal_payload)?, value))
        }
        _ => Err(parsing_error(&format!(
            "attribute has {} fields, expected 3",
            attribute.internal_containers.len()
        ))),
    }
}

fn read_uint(bytes: &[u8]) -> Result<u64, ReceiptReadError> {
    if bytes.len() > 8 {
        return Err(parsing_error(&format!(
            "integer of {} bytes does not fit in 64 bits",
            bytes.len()
        )));
    }
    Ok(bytes.iter().fold(0u64, |acc, byte| (acc << 8) | *byte as u64))
}

/// Content of an OCTET STRING, joining the chunks of a constructed (BER) one.
fn octet_string_content<'a>(container: &Asn1Container<'a>) -> Cow<'a, [u8]> {
    let chunked = container.encoding_type == EncodingType::Constructed
        && container.container_identifier == Asn1Identifier::OctetString
        && !container.internal_containers.is_empty()
        && container
            .internal_containers
            .iter()
            .all(|chunk| chunk.container_identifier == Asn1Identifier::OctetString);

    if chunked {
        Cow::Owned(
            container
                .internal_containers
                .iter()
                .flat_map(|chunk| chunk.internal_payload.iter().copied())
                .collect(),
        )
    } else {
        Cow::Borrowed(container.internal_payload)
    }
}

fn parsing_error(message: &str) -> ReceiptReadError {
    ReceiptReadError::ReceiptParsing(message.to_string())
}

fn missing(field: &str) -> ReceiptReadError {
    parsing_error(&format!("missing {field}"))
}

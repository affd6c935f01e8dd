//! Local parsing of App Store receipts.
//!
//! A receipt is a PKCS #7 container. The receipt itself sits in the container
//! that follows the `data` content type identifier; signatures and
//! certificates around it are not inspected.

pub mod apple_receipt;
pub mod asn1;
pub mod builder;
pub mod object_identifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use apple_receipt::{AppleReceipt, InAppPurchase};

use asn1::{Asn1Container, Asn1Identifier, ContainerBuilder, EncodingType};
use builder::ReceiptBuilder;
use object_identifier::ObjectIdentifier;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReceiptReadError {
    #[error("ASN.1 parsing failed: {0}")]
    Asn1Parsing(String),
    #[error("receipt does not contain a data object identifier")]
    DataObjectIdentifierMissing,
    #[error("receipt parsing failed: {0}")]
    ReceiptParsing(String),
}

#[derive(Debug, Clone, Default)]
pub struct ReceiptParser {
    container_builder: ContainerBuilder,
    receipt_builder: ReceiptBuilder,
}

impl ReceiptParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, receipt_data: &[u8]) -> Result<AppleReceipt, ReceiptReadError> {
        debug!("Parsing receipt of {} bytes", receipt_data.len());
        let container = self.container_builder.build(receipt_data)?;
        let receipt_container = find_container_after(ObjectIdentifier::Data, &container)
            .ok_or(ReceiptReadError::DataObjectIdentifierMissing)?;
        debug!("Receipt container: {receipt_container}");
        self.receipt_builder.build(receipt_container)
    }
}

/// Depth-first search for the container that directly follows an object
/// identifier container holding `object_identifier`.
fn find_container_after<'c, 'a>(
    object_identifier: ObjectIdentifier,
    container: &'c Asn1Container<'a>,
) -> Option<&'c Asn1Container<'a>> {
    if container.encoding_type != EncodingType::Constructed {
        return None;
    }

    let children = &container.internal_containers;
    for (index, child) in children.iter().enumerate() {
        if child.container_identifier == Asn1Identifier::ObjectIdentifier {
            if ObjectIdentifier::from_payload(child.internal_payload) == Some(object_identifier) {
                if let Some(next) = children.get(index + 1) {
                    return Some(next);
                }
            }
        } else if let Some(found) = find_container_after(object_identifier, child) {
            return Some(found);
        }
    }
    None
}

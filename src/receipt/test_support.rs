//! DER builders for receipt tests.

use super::object_identifier::{self, ObjectIdentifier};

pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut encoded = vec![tag];
    if content.len() < 128 {
        encoded.push(content.len() as u8);
    } else {
        let length_bytes: Vec<u8> = content
            .len()
            .to_be_bytes()
            .into_iter()
            .skip_while(|byte| *byte == 0)
            .collect();
        encoded.push(0x80 | length_bytes.len() as u8);
        encoded.extend(length_bytes);
    }
    encoded.extend_from_slice(content);
    encoded
}

/// BER indefinite-length constructed container.
pub fn indefinite(tag: u8, children: &[Vec<u8>]) -> Vec<u8> {
    let mut encoded = vec![tag, 0x80];
    encoded.extend(children.concat());
    encoded.extend([0, 0]);
    encoded
}

pub fn sequence(children: &[Vec<u8>]) -> Vec<u8> {
    tlv(0x30, &children.concat())
}

pub fn set(children: &[Vec<u8>]) -> Vec<u8> {
    tlv(0x31, &children.concat())
}

pub fn context_specific(number: u8, children: &[Vec<u8>]) -> Vec<u8> {
    tlv(0xA0 | number, &children.concat())
}

pub fn octet_string(bytes: &[u8]) -> Vec<u8> {
    tlv(0x04, bytes)
}

pub fn utf8_string(value: &str) -> Vec<u8> {
    tlv(0x0C, value.as_bytes())
}

pub fn integer(value: u64) -> Vec<u8> {
    let mut bytes: Vec<u8> = value
        .to_be_bytes()
        .into_iter()
        .skip_while(|byte| *byte == 0)
        .collect();
    if bytes.first().is_none_or(|byte| byte & 0x80 != 0) {
        bytes.insert(0, 0);
    }
    tlv(0x02, &bytes)
}

pub fn oid(identifier: ObjectIdentifier) -> Vec<u8> {
    let numbers: Vec<u64> = identifier
        .as_str()
        .split('.')
        .map(|n| n.parse().unwrap())
        .collect();
    tlv(0x06, &object_identifier::encode(&numbers))
}

pub fn receipt_attribute(attribute_type: u64, value: &[u8]) -> Vec<u8> {
    sequence(&[integer(attribute_type), integer(1), octet_string(value)])
}

pub fn receipt_string_attribute(attribute_type: u64, value: &str) -> Vec<u8> {
    receipt_attribute(attribute_type, &utf8_string(value))
}

pub fn receipt_int_attribute(attribute_type: u64, value: u64) -> Vec<u8> {
    receipt_attribute(attribute_type, &integer(value))
}

pub fn in_app_purchase(attributes: &[Vec<u8>]) -> Vec<u8> {
    receipt_attribute(17, &set(attributes))
}

/// The `[0]` container that follows the `data` identifier.
pub fn receipt_content(attributes: &[Vec<u8>]) -> Vec<u8> {
    context_specific(0, &[octet_string(&set(attributes))])
}

/// A minimal signed-data envelope around the receipt attributes.
pub fn pkcs7_receipt(attributes: &[Vec<u8>]) -> Vec<u8> {
    sequence(&[
        oid(ObjectIdentifier::SignedData),
        context_specific(
            0,
            &[sequence(&[
                integer(1),
                set(&[]),
                sequence(&[oid(ObjectIdentifier::Data), receipt_content(attributes)]),
            ])],
        ),
    ])
}

/// Same envelope with indefinite lengths and a chunked octet string, the way
/// the App Store encodes receipts.
pub fn pkcs7_receipt_ber(attributes: &[Vec<u8>]) -> Vec<u8> {
    let content = set(attributes);
    let chunks: Vec<Vec<u8>> = content.chunks(100).map(octet_string).collect();

    indefinite(
        0x30,
        &[
            oid(ObjectIdentifier::SignedData),
            indefinite(
                0xA0,
                &[indefinite(
                    0x30,
                    &[
                        integer(1),
                        set(&[]),
                        indefinite(
                            0x30,
                            &[
                                oid(ObjectIdentifier::Data),
                                indefinite(0xA0, &[indefinite(0x24, &chunks)]),
                            ],
                        ),
                    ],
                )],
            ),
        ],
    )
}

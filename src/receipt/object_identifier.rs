//! PKCS #7 content type identifiers.

use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectIdentifier {
    Data,
    SignedData,
    EnvelopedData,
    SignedAndEnvelopedData,
    DigestedData,
    EncryptedData,
}

impl ObjectIdentifier {
    pub const ALL: [ObjectIdentifier; 6] = [
        ObjectIdentifier::Data,
        ObjectIdentifier::SignedData,
        ObjectIdentifier::EnvelopedData,
        ObjectIdentifier::SignedAndEnvelopedData,
        ObjectIdentifier::DigestedData,
        ObjectIdentifier::EncryptedData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectIdentifier::Data => "1.2.840.113549.1.7.1",
            ObjectIdentifier::SignedData => "1.2.840.113549.1.7.2",
            ObjectIdentifier::EnvelopedData => "1.2.840.113549.1.7.3",
            ObjectIdentifier::SignedAndEnvelopedData => "1.2.840.113549.1.7.4",
            ObjectIdentifier::DigestedData => "1.2.840.113549.1.7.5",
            ObjectIdentifier::EncryptedData => "1.2.840.113549.1.7.6",
        }
    }

    /// Decodes the content of an OBJECT IDENTIFIER container.
    ///
    /// Returns `None` for empty payloads and identifiers outside PKCS #7.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        decode_dotted(payload)?.parse().ok()
    }
}

impl Display for ObjectIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectIdentifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectIdentifier::ALL
            .into_iter()
            .find(|oid| oid.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown object identifier: {}", s))
    }
}

/// Decodes an OID payload into its dotted form, e.g. `1.2.840.113549.1.7.1`.
///
/// The first byte packs the first two arcs as `40 * a + b`; following arcs
/// are base-128 with the high bit set on every byte but the last.
pub fn decode_dotted(payload: &[u8]) -> Option<String> {
    let (first, rest) = payload.split_first()?;

    let mut numbers: Vec<u64> = vec![(first / 40) as u64, (first % 40) as u64];
    let mut current: u64 = 0;
    let mut pending = false;
    for byte in rest {
        current = current.checked_mul(128)? | (byte & 0b0111_1111) as u64;
        pending = byte & 0b1000_0000 != 0;
        if !pending {
            numbers.push(current);
            current = 0;
        }
    }
    if pending {
        return None;
    }

    Some(
        numbers
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join("."),
    )
}

#[cfg(test)]
pub(crate) fn encode(numbers: &[u64]) -> Vec<u8> {
    let mut encoded = vec![(numbers[0] * 40 + numbers[1]) as u8];
    for number in &numbers[2..] {
        let mut groups = vec![(number & 0x7f) as u8];
        let mut rest = number >> 7;
        while rest > 0 {
            groups.push((rest & 0x7f) as u8 | 0x80);
            rest >>= 7;
        }
        encoded.extend(groups.into_iter().rev());
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_for(oid: ObjectIdentifier) -> Vec<u8> {
        let numbers: Vec<u64> = oid
            .as_str()
            .split('.')
            .map(|n| n.parse().unwrap())
            .collect();
        encode(&numbers)
    }

    #[test]
    fn test_data_payload_matches_known_bytes() {
        assert_eq!(
            payload_for(ObjectIdentifier::Data),
            vec![42, 134, 72, 134, 247, 13, 1, 7, 1]
        );
    }

    #[test]
    fn test_from_payload_for_every_pkcs7_type() {
        for oid in ObjectIdentifier::ALL {
            assert_eq!(ObjectIdentifier::from_payload(&payload_for(oid)), Some(oid));
        }
    }

    #[test]
    fn test_from_payload_unknown_identifier() {
        let payload = encode(&[1, 3, 23, 534643, 7454, 1, 7, 2]);
        assert_eq!(
            decode_dotted(&payload).as_deref(),
            Some("1.3.23.534643.7454.1.7.2")
        );
        assert_eq!(ObjectIdentifier::from_payload(&payload), None);
    }

    #[test]
    fn test_from_payload_empty() {
        assert_eq!(ObjectIdentifier::from_payload(&[]), None);
    }

    #[test]
    fn test_truncated_multibyte_arc() {
        assert_eq!(decode_dotted(&[42, 0x86]), None);
    }
}

//! Tag-length-value decoding for BER/DER encoded ASN.1 data.

use super::ReceiptReadError;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asn1Class {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

impl Asn1Class {
    fn from_identifier_byte(byte: u8) -> Self {
        match byte >> 6 {
            0 => Asn1Class::Universal,
            1 => Asn1Class::Application,
            2 => Asn1Class::ContextSpecific,
            _ => Asn1Class::Private,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingType {
    Primitive,
    Constructed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Asn1Identifier {
    EndOfContent = 0,
    Boolean = 1,
    Integer = 2,
    BitString = 3,
    OctetString = 4,
    Null = 5,
    ObjectIdentifier = 6,
    ObjectDescriptor = 7,
    External = 8,
    Real = 9,
    Enumerated = 10,
    EmbeddedPdv = 11,
    Utf8String = 12,
    RelativeOid = 13,
    Sequence = 16,
    Set = 17,
    NumericString = 18,
    PrintableString = 19,
    T61String = 20,
    VideotexString = 21,
    Ia5String = 22,
    UtcTime = 23,
    GeneralizedTime = 24,
    GraphicString = 25,
    VisibleString = 26,
    GeneralString = 27,
    UniversalString = 28,
    CharacterString = 29,
    BmpString = 30,
}

impl Asn1Identifier {
    pub const ALL: [Asn1Identifier; 29] = [
        Asn1Identifier::EndOfContent,
        Asn1Identifier::Boolean,
        Asn1Identifier::Integer,
        Asn1Identifier::BitString,
        Asn1Identifier::OctetString,
        Asn1Identifier::Null,
        Asn1Identifier::ObjectIdentifier,
        Asn1Identifier::ObjectDescriptor,
        Asn1Identifier::External,
        Asn1Identifier::Real,
        Asn1Identifier::Enumerated,
        Asn1Identifier::EmbeddedPdv,
        Asn1Identifier::Utf8String,
        Asn1Identifier::RelativeOid,
        Asn1Identifier::Sequence,
        Asn1Identifier::Set,
        Asn1Identifier::NumericString,
        Asn1Identifier::PrintableString,
        Asn1Identifier::T61String,
        Asn1Identifier::VideotexString,
        Asn1Identifier::Ia5String,
        Asn1Identifier::UtcTime,
        Asn1Identifier::GeneralizedTime,
        Asn1Identifier::GraphicString,
        Asn1Identifier::VisibleString,
        Asn1Identifier::GeneralString,
        Asn1Identifier::UniversalString,
        Asn1Identifier::CharacterString,
        Asn1Identifier::BmpString,
    ];
}

impl TryFrom<u8> for Asn1Identifier {
    type Error = ReceiptReadError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Asn1Identifier::ALL
            .into_iter()
            .find(|identifier| *identifier as u8 == value)
            .ok_or_else(|| ReceiptReadError::Asn1Parsing(format!("unknown identifier {value}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Asn1Length {
    /// Number of content bytes.
    pub value: usize,
    /// Bytes taken by the length field itself.
    pub bytes_used: usize,
    /// BER indefinite form: content ends with an end-of-contents marker.
    pub indefinite: bool,
}

impl Asn1Length {
    fn definite(value: usize, bytes_used: usize) -> Self {
        Self {
            value,
            bytes_used,
            indefinite: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asn1Container<'a> {
    pub container_class: Asn1Class,
    pub container_identifier: Asn1Identifier,
    pub encoding_type: EncodingType,
    pub length: Asn1Length,
    pub internal_payload: &'a [u8],
    pub internal_containers: Vec<Asn1Container<'a>>,
}

impl Asn1Container<'_> {
    const IDENTIFIER_BYTES: usize = 1;
    const END_OF_CONTENTS_BYTES: usize = 2;

    pub fn total_bytes(&self) -> usize {
        let trailer = if self.length.indefinite {
            Self::END_OF_CONTENTS_BYTES
        } else {
            0
        };
        Self::IDENTIFIER_BYTES + self.length.bytes_used + self.length.value + trailer
    }
}

impl Display for Asn1Container<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}/{:?}/{:?} ({} bytes, {} children)",
            self.container_class,
            self.encoding_type,
            self.container_identifier,
            self.length.value,
            self.internal_containers.len()
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerBuilder;

impl ContainerBuilder {
    /// Deepest container nesting accepted.
    pub const MAX_DEPTH: usize = 64;

    pub fn new() -> Self {
        Self
    }

    pub fn build<'a>(&self, payload: &'a [u8]) -> Result<Asn1Container<'a>, ReceiptReadError> {
        self.build_at_depth(payload, 0)
    }

    fn build_at_depth<'a>(
        &self,
        payload: &'a [u8],
        depth: usize,
    ) -> Result<Asn1Container<'a>, ReceiptReadError> {
        if depth > Self::MAX_DEPTH {
            return Err(ReceiptReadError::Asn1Parsing(format!(
                "nesting too deep, more than {} levels",
                Self::MAX_DEPTH
            )));
        }
        if payload.len() < 2 {
            return Err(ReceiptReadError::Asn1Parsing(format!(
                "payload of {} bytes is too small for a container",
                payload.len()
            )));
        }

        let identifier_byte = payload[0];
        let container_class = Asn1Class::from_identifier_byte(identifier_byte);
        let encoding_type = if identifier_byte & 0b0010_0000 != 0 {
            EncodingType::Constructed
        } else {
            EncodingType::Primitive
        };
        let container_identifier = Asn1Identifier::try_from(identifier_byte & 0b0001_1111)?;

        let length = self.extract_length(&payload[Asn1Container::IDENTIFIER_BYTES..])?;
        let content_start = Asn1Container::IDENTIFIER_BYTES + length.bytes_used;
        let content = &payload[content_start..];

        if length.indefinite {
            if encoding_type != EncodingType::Constructed {
                return Err(ReceiptReadError::Asn1Parsing(
                    "indefinite length on a primitive container".to_string(),
                ));
            }
            let (internal_containers, consumed) = self.build_until_end_of_contents(content, depth)?;
            return Ok(Asn1Container {
                container_class,
                container_identifier,
                encoding_type,
                length: Asn1Length {
                    value: consumed,
                    ..length
                },
                internal_payload: &content[..consumed],
                internal_containers,
            });
        }

        let internal_payload = content.get(..length.value).ok_or_else(|| {
            ReceiptReadError::Asn1Parsing(format!(
                "declared length {} exceeds the {} bytes available",
                length.value,
                content.len()
            ))
        })?;

        let internal_containers = match encoding_type {
            EncodingType::Constructed => {
                self.build_internal_containers(internal_payload, depth)?
            }
            EncodingType::Primitive => Vec::new(),
        };

        Ok(Asn1Container {
            container_class,
            container_identifier,
            encoding_type,
            length,
            internal_payload,
            internal_containers,
        })
    }

    fn build_internal_containers<'a>(
        &self,
        mut payload: &'a [u8],
        depth: usize,
    ) -> Result<Vec<Asn1Container<'a>>, ReceiptReadError> {
        let mut containers = Vec::new();
        while !payload.is_empty() {
            let container = self.build_at_depth(payload, depth + 1)?;
            payload = &payload[container.total_bytes()..];
            containers.push(container);
        }
        Ok(containers)
    }

    fn build_until_end_of_contents<'a>(
        &self,
        payload: &'a [u8],
        depth: usize,
    ) -> Result<(Vec<Asn1Container<'a>>, usize), ReceiptReadError> {
        let mut containers = Vec::new();
        let mut consumed = 0;
        loop {
            let rest = &payload[consumed..];
            match rest {
                [0, 0, ..] => return Ok((containers, consumed)),
                [] | [_] => {
                    return Err(ReceiptReadError::Asn1Parsing(
                        "missing end-of-contents marker".to_string(),
                    ));
                }
                _ => {
                    let container = self.build_at_depth(rest, depth + 1)?;
                    consumed += container.total_bytes();
                    containers.push(container);
                }
            }
        }
    }

    fn extract_length(&self, data: &[u8]) -> Result<Asn1Length, ReceiptReadError> {
        let first_byte = *data
            .first()
            .ok_or_else(|| ReceiptReadError::Asn1Parsing("missing length byte".to_string()))?;

        if first_byte & 0b1000_0000 == 0 {
            return Ok(Asn1Length::definite(first_byte as usize, 1));
        }

        let length_octets = (first_byte & 0b0111_1111) as usize;
        if length_octets == 0 {
            return Ok(Asn1Length {
                value: 0,
                bytes_used: 1,
                indefinite: true,
            });
        }
        if length_octets > std::mem::size_of::<usize>() {
            return Err(ReceiptReadError::Asn1Parsing(format!(
                "length field of {length_octets} bytes is too large"
            )));
        }

        let length_bytes = data.get(1..=length_octets).ok_or_else(|| {
            ReceiptReadError::Asn1Parsing("length field is truncated".to_string())
        })?;
        let value = length_bytes
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | *byte as usize);

        Ok(Asn1Length::definite(value, length_octets + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOCK_CONTAINER_PAYLOAD: [u8; 9] = [0b01; 9];

    fn with_identifier(identifier_byte: u8) -> Vec<u8> {
        let mut payload = MOCK_CONTAINER_PAYLOAD.to_vec();
        payload.insert(0, identifier_byte);
        payload
    }

    #[test]
    fn test_build_extracts_class() {
        let builder = ContainerBuilder::new();
        for (byte, expected) in [
            (0b0000_0000, Asn1Class::Universal),
            (0b0100_0000, Asn1Class::Application),
            (0b1000_0000, Asn1Class::ContextSpecific),
            (0b1100_0000, Asn1Class::Private),
        ] {
            let payload = with_identifier(byte);
            assert_eq!(builder.build(&payload).unwrap().container_class, expected);
        }
    }

    #[test]
    fn test_build_extracts_encoding_type() {
        let builder = ContainerBuilder::new();
        let payload = with_identifier(0b0000_0000);
        assert_eq!(
            builder.build(&payload).unwrap().encoding_type,
            EncodingType::Primitive
        );

        // constructed, holding one 1-byte container
        let mut payload = with_identifier(0b0010_0000);
        payload.insert(1, 3);
        assert_eq!(
            builder.build(&payload).unwrap().encoding_type,
            EncodingType::Constructed
        );
    }

    #[test]
    fn test_build_extracts_identifier() {
        let builder = ContainerBuilder::new();
        for expected in Asn1Identifier::ALL {
            let payload = with_identifier(expected as u8);
            assert_eq!(
                builder.build(&payload).unwrap().container_identifier,
                expected
            );
        }
    }

    #[test]
    fn test_build_rejects_unknown_identifier() {
        let payload = with_identifier(31);
        assert!(matches!(
            ContainerBuilder::new().build(&payload),
            Err(ReceiptReadError::Asn1Parsing(_))
        ));
    }

    #[test]
    fn test_build_extracts_short_length() {
        let short_length = (MOCK_CONTAINER_PAYLOAD.len() - 1) as u8;
        let mut payload = MOCK_CONTAINER_PAYLOAD.to_vec();
        payload.insert(1, short_length);

        let container = ContainerBuilder::new().build(&payload).unwrap();
        assert_eq!(container.length.value, short_length as usize);
        assert_eq!(container.length.bytes_used, 1);
        assert_eq!(container.internal_payload.len(), short_length as usize);
        assert_eq!(
            container.internal_payload,
            &payload[2..2 + short_length as usize]
        );
    }

    #[test]
    fn test_build_extracts_long_length() {
        // high bit marks long form, low bits count the length bytes that follow
        let length_header = [0b1000_0011, 0b1, 0b1, 0b11];
        let expected_length = 0x01_01_03;

        let payload: Vec<u8> = [vec![0u8], length_header.to_vec(), vec![0u8; 100_000]].concat();

        let container = ContainerBuilder::new().build(&payload).unwrap();
        assert_eq!(container.length.value, expected_length);
        assert_eq!(container.length.bytes_used, 4);
        assert_eq!(container.internal_payload.len(), expected_length);
        assert_eq!(
            container.internal_payload,
            &payload[1 + length_header.len()..1 + length_header.len() + expected_length]
        );
        assert_eq!(
            container.total_bytes(),
            1 + length_header.len() + expected_length
        );
    }

    #[test]
    fn test_build_fails_when_payload_shorter_than_short_length() {
        let mut payload = MOCK_CONTAINER_PAYLOAD.to_vec();
        payload.insert(1, 55);
        assert!(ContainerBuilder::new().build(&payload).is_err());
    }

    #[test]
    fn test_build_fails_when_payload_shorter_than_long_length() {
        let payload = [0b1, 0b1000_0011, 0b1, 0b1, 0b11, 0b1];
        assert!(ContainerBuilder::new().build(&payload).is_err());
    }

    #[test]
    fn test_build_total_bytes_for_short_length() {
        let mut payload = vec![0u8; 100];
        payload.insert(1, 0b0000_0111);

        let container = ContainerBuilder::new().build(&payload).unwrap();
        assert_eq!(container.total_bytes(), 1 + 1 + container.internal_payload.len());
        assert_eq!(container.internal_payload.len(), container.length.value);
    }

    #[test]
    fn test_build_fails_when_payload_too_small() {
        assert!(ContainerBuilder::new().build(&[0b1]).is_err());
        assert!(ContainerBuilder::new().build(&[]).is_err());
    }

    #[test]
    fn test_build_internal_containers_when_constructed() {
        let first: Vec<u8> = [vec![0b1, 4], vec![0b1; 4]].concat();
        let second: Vec<u8> = [vec![0b1, 6], vec![0b1; 6]].concat();
        let payload: Vec<u8> = [
            vec![0b0010_0000, (first.len() + second.len()) as u8],
            first,
            second,
        ]
        .concat();

        let container = ContainerBuilder::new().build(&payload).unwrap();
        assert_eq!(container.internal_containers.len(), 2);
        assert_eq!(container.internal_containers[0].internal_payload, &[0b1; 4]);
        assert_eq!(container.internal_containers[1].internal_payload, &[0b1; 6]);
    }

    #[test]
    fn test_build_no_internal_containers_when_primitive() {
        let payload = with_identifier(0b0000_0000);
        let container = ContainerBuilder::new().build(&payload).unwrap();
        assert_eq!(container.encoding_type, EncodingType::Primitive);
        assert!(container.internal_containers.is_empty());
    }

    #[test]
    fn test_build_fails_when_constructed_payload_is_not_containers() {
        let payload = with_identifier(0b0010_0000);
        assert!(ContainerBuilder::new().build(&payload).is_err());
    }

    #[test]
    fn test_build_indefinite_length() {
        // SEQUENCE (indefinite) { INTEGER 5, OCTET STRING "ab" } 00 00, then trailing data
        let payload = [
            0x30, 0x80, 0x02, 0x01, 0x05, 0x04, 0x02, b'a', b'b', 0x00, 0x00, 0xff,
        ];

        let container = ContainerBuilder::new().build(&payload).unwrap();
        assert!(container.length.indefinite);
        assert_eq!(container.length.value, 7);
        assert_eq!(container.internal_containers.len(), 2);
        assert_eq!(
            container.internal_containers[1].container_identifier,
            Asn1Identifier::OctetString
        );
        assert_eq!(container.total_bytes(), 11);
    }

    #[test]
    fn test_build_indefinite_length_without_terminator_fails() {
        let payload = [0x30, 0x80, 0x02, 0x01, 0x05];
        assert!(ContainerBuilder::new().build(&payload).is_err());

        let primitive = [0x04, 0x80, 0x00, 0x00];
        assert!(ContainerBuilder::new().build(&primitive).is_err());
    }

    #[test]
    fn test_build_rejects_deep_nesting() {
        let nested = |levels: usize| {
            let mut payload = vec![0x04, 0x00];
            for _ in 0..levels {
                let header = match payload.len() {
                    len @ 0..=127 => vec![0x30, len as u8],
                    len => vec![0x30, 0x81, len as u8],
                };
                payload = [header, payload].concat();
            }
            payload
        };

        let max_depth = nested(ContainerBuilder::MAX_DEPTH);
        let container = ContainerBuilder::new().build(&max_depth);
        assert!(container.is_ok());

        let too_deep = nested(ContainerBuilder::MAX_DEPTH + 1);
        assert!(matches!(
            ContainerBuilder::new().build(&too_deep),
            Err(ReceiptReadError::Asn1Parsing(_))
        ));
    }

    #[test]
    fn test_build_rejects_endless_indefinite_headers() {
        let payload = [0x30, 0x80].repeat(32_768);
        assert!(matches!(
            ContainerBuilder::new().build(&payload),
            Err(ReceiptReadError::Asn1Parsing(_))
        ));
    }

    #[test]
    fn test_display_summarizes_container() {
        let payload = [0x30, 0x06, 0x02, 0x01, 0x05, 0x04, 0x01, 0xff];
        let container = ContainerBuilder::new().build(&payload).unwrap();
        assert_eq!(
            container.to_string(),
            "Universal/Constructed/Sequence (6 bytes, 2 children)"
        );
    }
}

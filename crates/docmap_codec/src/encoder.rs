//! Canonical CBOR encoder.
//!
//! Documents are encoded deterministically so that two logically equal
//! documents always produce the same bytes. The mapping layer hashes these
//! bytes to detect unchanged entities; the encoding never leaves the
//! process, so non-standard kinds use private tags.

use crate::document::Document;
use crate::value::Value;

/// Tag for dates (milliseconds since the Unix epoch).
const TAG_DATE_MILLIS: u64 = 1001;
/// Tag for identifiers (RFC 9562 UUID).
const TAG_UUID: u64 = 37;
/// Tag for regular expressions.
const TAG_REGEX: u64 = 35;
/// Tag distinguishing 32-bit integers from 64-bit ones.
const TAG_INT32: u64 = 1002;

/// Encode a value to canonical CBOR bytes.
///
/// This function produces deterministic output:
/// - Map keys are sorted by their encoded form (length-first, then bytewise)
/// - Integers use the shortest possible encoding
/// - No indefinite-length encoding
/// - All NaN payloads collapse to a single quiet NaN
pub fn to_canonical_cbor(value: &Value) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value);
    encoder.into_bytes()
}

/// Encode a document to canonical CBOR bytes.
pub fn document_to_canonical_cbor(doc: &Document) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode_document(doc);
    encoder.into_bytes()
}

/// A canonical CBOR encoder.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Int32(n) => {
                self.encode_unsigned(6, TAG_INT32);
                self.encode_integer(i64::from(*n));
            }
            Value::Int64(n) => self.encode_integer(*n),
            Value::Double(n) => self.encode_double(*n),
            Value::Text(s) => self.encode_text(s),
            Value::Bytes(b) => {
                self.encode_unsigned(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Date(t) => {
                self.encode_unsigned(6, TAG_DATE_MILLIS);
                self.encode_integer(t.as_millis());
            }
            Value::Id(id) => {
                self.encode_unsigned(6, TAG_UUID);
                self.encode_unsigned(2, 16);
                self.buffer.extend_from_slice(id.as_bytes());
            }
            Value::Regex(regex) => {
                self.encode_unsigned(6, TAG_REGEX);
                self.encode_unsigned(4, 2);
                self.encode_text(&regex.pattern);
                self.encode_text(&regex.options);
            }
            Value::Array(items) => {
                self.encode_unsigned(4, items.len() as u64);
                for item in items {
                    self.encode(item);
                }
            }
            Value::Document(doc) => self.encode_document(doc),
        }
    }

    /// Encode a document as a map with sorted keys.
    pub fn encode_document(&mut self, doc: &Document) {
        let mut pairs: Vec<(Vec<u8>, &Value)> = doc
            .iter()
            .map(|(key, value)| {
                let mut key_encoder = CanonicalEncoder::new();
                key_encoder.encode_text(key);
                (key_encoder.into_bytes(), value)
            })
            .collect();

        // Sort by encoded key (length-first, then bytewise)
        pairs.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        self.encode_unsigned(5, pairs.len() as u64);
        for (encoded_key, value) in pairs {
            self.buffer.extend_from_slice(&encoded_key);
            self.encode(value);
        }
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_unsigned(0, n as u64);
        } else {
            // CBOR negative integers encode -(n+1)
            self.encode_unsigned(1, (-(n + 1)) as u64);
        }
    }

    fn encode_double(&mut self, n: f64) {
        let bits = if n.is_nan() {
            0x7ff8_0000_0000_0000
        } else if n == 0.0 {
            // -0.0 and 0.0 are equal values
            0
        } else {
            n.to_bits()
        };
        self.buffer.push(0xfb);
        self.buffer.extend_from_slice(&bits.to_be_bytes());
    }

    fn encode_text(&mut self, text: &str) {
        self.encode_unsigned(3, text.len() as u64);
        self.buffer.extend_from_slice(text.as_bytes());
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_unsigned(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if u32::try_from(value).is_ok() {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::id::EntityId;

    #[test]
    fn encode_small_integers() {
        assert_eq!(to_canonical_cbor(&Value::Int64(0)), vec![0x00]);
        assert_eq!(to_canonical_cbor(&Value::Int64(23)), vec![0x17]);
        assert_eq!(to_canonical_cbor(&Value::Int64(24)), vec![0x18, 24]);
        assert_eq!(to_canonical_cbor(&Value::Int64(-1)), vec![0x20]);
        assert_eq!(to_canonical_cbor(&Value::Int64(-25)), vec![0x38, 24]);
    }

    #[test]
    fn int_widths_encode_differently() {
        assert_ne!(
            to_canonical_cbor(&Value::Int32(7)),
            to_canonical_cbor(&Value::Int64(7))
        );
    }

    #[test]
    fn encode_text() {
        assert_eq!(
            to_canonical_cbor(&Value::Text("a".to_string())),
            vec![0x61, b'a']
        );
    }

    #[test]
    fn encode_map_sorted() {
        // Keys are sorted length first, then bytewise
        let d = doc! { "bb" => 2i64, "a" => 1i64 };
        assert_eq!(
            document_to_canonical_cbor(&d),
            vec![0xa2, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]
        );
    }

    #[test]
    fn deterministic_encoding() {
        let id = EntityId::new();
        let d1 = doc! { "z" => 1, "_id" => id, "a" => "x" };
        let d2 = doc! { "a" => "x", "z" => 1, "_id" => id };
        assert_eq!(document_to_canonical_cbor(&d1), document_to_canonical_cbor(&d2));
    }

    #[test]
    fn nan_and_signed_zero_are_canonical() {
        let a = to_canonical_cbor(&Value::Double(f64::NAN));
        let b = to_canonical_cbor(&Value::Double(-f64::NAN));
        assert_eq!(a, b);
        assert_eq!(
            to_canonical_cbor(&Value::Double(0.0)),
            to_canonical_cbor(&Value::Double(-0.0))
        );
    }

    #[test]
    fn nested_values_change_encoding() {
        let a = doc! { "inner" => doc! { "n" => 1 } };
        let b = doc! { "inner" => doc! { "n" => 2 } };
        assert_ne!(document_to_canonical_cbor(&a), document_to_canonical_cbor(&b));
    }

    mod properties {
        use crate::{document_to_canonical_cbor, to_canonical_cbor, Document, Value};
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn insertion_order_is_irrelevant(
                fields in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
            ) {
                let forward: Document = fields.iter().map(|(k, v)| (k.clone(), *v)).collect();
                let backward: Document = fields.iter().rev().map(|(k, v)| (k.clone(), *v)).collect();
                prop_assert_eq!(
                    document_to_canonical_cbor(&forward),
                    document_to_canonical_cbor(&backward)
                );
            }

            #[test]
            fn integers_encode_to_bounded_length(n in any::<i64>()) {
                let bytes = to_canonical_cbor(&Value::Int64(n));
                prop_assert!(!bytes.is_empty() && bytes.len() <= 9);
            }
        }
    }
}

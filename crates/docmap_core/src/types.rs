//! Core type definitions for docmap.

use docmap_codec::{document_to_canonical_cbor, Document};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifies a model type by its collection name.
///
/// Each model maps to exactly one collection, so the name doubles as the
/// type identifier in schemas, the registry and the pool.
pub type ModelKey = &'static str;

/// SHA-256 of a document's canonical encoding.
///
/// Used only to detect saves that would not change the stored document.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hashes the canonical encoding of `doc`.
    ///
    /// Field order does not affect the hash.
    #[must_use]
    pub fn of(doc: &Document) -> Self {
        let digest = Sha256::digest(document_to_canonical_cbor(doc));
        Self(digest.into())
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first eight bytes are plenty to tell hashes apart in logs.
        write!(f, "ContentHash(")?;
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_codec::doc;

    #[test]
    fn hash_ignores_field_order() {
        let a = doc! { "name" => "Alice", "age" => 30 };
        let b = doc! { "age" => 30, "name" => "Alice" };
        assert_eq!(ContentHash::of(&a), ContentHash::of(&b));
    }

    #[test]
    fn hash_tracks_content() {
        let a = doc! { "age" => 30 };
        let b = doc! { "age" => 31 };
        assert_ne!(ContentHash::of(&a), ContentHash::of(&b));
    }

    #[test]
    fn display_is_hex() {
        let hash = ContentHash::of(&Document::new());
        let text = hash.to_string();
        assert_eq!(text.len(), 64);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

//! # docmap Codec
//!
//! Document value model and typed field codec for docmap.
//!
//! This crate provides:
//! - [`Value`] and [`Document`], the structured values exchanged with the
//!   document store
//! - [`EntityId`], the identifier stored under `_id`
//! - [`FieldValue`], the bidirectional conversion between Rust field types
//!   and stored values, with [`FieldPath`] error context
//! - canonical CBOR encoding, so identical documents produce identical
//!   bytes for content hashing
//!
//! ## Usage
//!
//! ```
//! use docmap_codec::{doc, DocumentReader, FieldValue};
//!
//! let d = doc! { "name" => "Alice", "tags" => vec!["a".to_string()].encode() };
//! let reader = DocumentReader::new(&d);
//! let tags: Vec<String> = reader.field("tags").unwrap();
//! assert_eq!(tags, vec!["a".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod encoder;
mod error;
mod field;
mod id;
mod path;
mod value;

pub use document::{Document, ID_KEY};
pub use encoder::{document_to_canonical_cbor, to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use field::{decode_enum, encode_enum, Binary, DocumentReader, EnumCases, FieldValue};
pub use id::EntityId;
pub use path::FieldPath;
pub use value::{Regex, Timestamp, Value, ValueKind};

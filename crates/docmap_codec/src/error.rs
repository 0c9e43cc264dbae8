//! Error types for the codec crate.

use crate::path::FieldPath;
use crate::value::ValueKind;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding a stored value into a typed field.
///
/// Encoding never fails; every error here is a decode-time error and always
/// carries the exact location of the offending value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The stored value does not have the kind the field expects.
    ///
    /// `found` is `None` when the value is absent altogether.
    #[error("type mismatch at `{path}`: expected {expected}, found {}", found.map_or("nothing".to_string(), |k| k.to_string()))]
    TypeMismatch {
        /// Location of the value inside the document.
        path: FieldPath,
        /// Kind the field expects.
        expected: ValueKind,
        /// Kind actually stored, if any.
        found: Option<ValueKind>,
    },

    /// A string tag did not match any case of an enumeration.
    #[error("unknown case `{tag}` for enum {enum_name}")]
    UnknownEnumCase {
        /// Name of the enumeration.
        enum_name: &'static str,
        /// The tag that was stored.
        tag: String,
    },

    /// A value had the right kind but could not be represented.
    #[error("invalid value at `{path}`: {message}")]
    InvalidValue {
        /// Location of the value inside the document.
        path: FieldPath,
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Create a type mismatch error.
    pub fn type_mismatch(path: &FieldPath, expected: ValueKind, found: Option<ValueKind>) -> Self {
        Self::TypeMismatch {
            path: path.clone(),
            expected,
            found,
        }
    }

    /// Create an unknown enum case error.
    pub fn unknown_enum_case(enum_name: &'static str, tag: impl Into<String>) -> Self {
        Self::UnknownEnumCase {
            enum_name,
            tag: tag.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(path: &FieldPath, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            path: path.clone(),
            message: message.into(),
        }
    }

    /// Returns the field path the error is attributed to, if any.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            Self::TypeMismatch { path, .. } | Self::InvalidValue { path, .. } => Some(path),
            Self::UnknownEnumCase { .. } => None,
        }
    }
}

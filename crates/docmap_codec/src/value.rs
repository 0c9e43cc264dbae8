//! Dynamic document value type.

use crate::document::Document;
use crate::id::EntityId;
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A dynamic stored value.
///
/// This is the structured value model exchanged with the document store:
/// scalars, ordered arrays and embedded documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Double(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Point in time, milliseconds since the Unix epoch.
    Date(Timestamp),
    /// Entity identifier.
    Id(EntityId),
    /// Regular expression.
    Regex(Regex),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Embedded document.
    Document(Document),
}

/// The kind of a [`Value`], used in type mismatch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// [`Value::Null`]
    Null,
    /// [`Value::Bool`]
    Bool,
    /// [`Value::Int32`]
    Int32,
    /// [`Value::Int64`]
    Int64,
    /// [`Value::Double`]
    Double,
    /// [`Value::Text`]
    Text,
    /// [`Value::Bytes`]
    Bytes,
    /// [`Value::Date`]
    Date,
    /// [`Value::Id`]
    Id,
    /// [`Value::Regex`]
    Regex,
    /// [`Value::Array`]
    Array,
    /// [`Value::Document`]
    Document,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::Double => "double",
            ValueKind::Text => "string",
            ValueKind::Bytes => "binary",
            ValueKind::Date => "date",
            ValueKind::Id => "identifier",
            ValueKind::Regex => "regex",
            ValueKind::Array => "array",
            ValueKind::Document => "document",
        };
        f.write_str(name)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// Returns the raw millisecond count.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

/// A regular expression value: a pattern plus option flags (`i`, `m`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regex {
    /// The pattern source.
    pub pattern: String,
    /// Option flags, one character each.
    pub options: String,
}

impl Regex {
    /// Creates a regular expression value.
    pub fn new(pattern: impl Into<String>, options: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            options: options.into(),
        }
    }

    /// Escapes every regex metacharacter in `literal`.
    #[must_use]
    pub fn escape(literal: &str) -> String {
        let mut escaped = String::with_capacity(literal.len());
        for c in literal.chars() {
            if "\\^$.|?*+()[]{}".contains(c) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::Double(_) => ValueKind::Double,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Date(_) => ValueKind::Date,
            Value::Id(_) => ValueKind::Id,
            Value::Regex(_) => ValueKind::Regex,
            Value::Array(_) => ValueKind::Array,
            Value::Document(_) => ValueKind::Document,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a 32-bit integer, if it is one.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a 64-bit integer. 32-bit integers widen losslessly.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a double, if it is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a timestamp, if it is a date.
    pub fn as_date(&self) -> Option<Timestamp> {
        match self {
            Value::Date(t) => Some(*t),
            _ => None,
        }
    }

    /// Get this value as an entity identifier, if it is one.
    pub fn as_id(&self) -> Option<EntityId> {
        match self {
            Value::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as an embedded document, if it is one.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Numeric view used for cross-width comparisons.
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int32(n) => Some(f64::from(*n)),
            #[allow(clippy::cast_precision_loss)]
            Value::Int64(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Compares two values of comparable kinds.
    ///
    /// Numbers compare across widths; text, dates, identifiers, booleans and
    /// byte strings compare within their own kind. Returns `None` for
    /// incomparable kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
            (Value::Int64(_) | Value::Int32(_), Value::Int64(_) | Value::Int32(_)) => {
                Some(self.as_i64()?.cmp(&other.as_i64()?))
            }
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Id(a), Value::Id(b)) => Some(a.cmp(b)),
            _ => self.as_number()?.partial_cmp(&other.as_number()?),
        }
    }

    /// Total order used for sorting mixed-kind values.
    ///
    /// Kinds are ranked (null, numbers, text, document, array, binary,
    /// identifier, bool, date, regex) and values of the same rank use
    /// [`Value::compare`].
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        let rank = self.sort_rank().cmp(&other.sort_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        if let Some(ordering) = self.compare(other) {
            return ordering;
        }
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                for (av, bv) in a.iter().zip(b.iter()) {
                    let ord = av.sort_cmp(bv);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Regex(a), Value::Regex(b)) => a.pattern.cmp(&b.pattern),
            _ => Ordering::Equal,
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int32(_) | Value::Int64(_) | Value::Double(_) => 1,
            Value::Text(_) => 2,
            Value::Document(_) => 3,
            Value::Array(_) => 4,
            Value::Bytes(_) => 5,
            Value::Id(_) => 6,
            Value::Bool(_) => 7,
            Value::Date(_) => 8,
            Value::Regex(_) => 9,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Date(t)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Id(id)
    }
}

impl From<Regex> for Value {
    fn from(regex: Regex) -> Self {
        Value::Regex(regex)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Document(doc)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

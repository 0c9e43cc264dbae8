//! Typed field codec.
//!
//! [`FieldValue`] converts between a Rust field type and the stored
//! [`Value`] model. Encoding is total; decoding reports failures with the
//! exact [`FieldPath`] of the offending value.

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::id::EntityId;
use crate::path::FieldPath;
use crate::value::{Regex, Timestamp, Value, ValueKind};
use std::collections::BTreeMap;

/// A type that can be stored as a document field.
pub trait FieldValue: Sized {
    /// Converts the value to its stored representation.
    fn encode(&self) -> Value;

    /// Reads the value back from storage.
    ///
    /// `value` is `None` when the field is absent from the document. `path`
    /// locates the field and must be used for every reported error.
    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self>;
}

// Absent and null both fail for required fields.
fn present<'a>(
    value: Option<&'a Value>,
    path: &FieldPath,
    expected: ValueKind,
) -> CodecResult<&'a Value> {
    match value {
        None => Err(CodecError::type_mismatch(path, expected, None)),
        Some(Value::Null) => Err(CodecError::type_mismatch(
            path,
            expected,
            Some(ValueKind::Null),
        )),
        Some(v) => Ok(v),
    }
}

fn mismatch<T>(value: &Value, path: &FieldPath, expected: ValueKind) -> CodecResult<T> {
    Err(CodecError::type_mismatch(path, expected, Some(value.kind())))
}

macro_rules! scalar_field {
    ($ty:ty, $kind:expr, $accessor:expr, $variant:expr) => {
        impl FieldValue for $ty {
            fn encode(&self) -> Value {
                $variant(self.clone())
            }

            fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
                let v = present(value, path, $kind)?;
                match $accessor(v) {
                    Some(decoded) => Ok(decoded),
                    None => mismatch(v, path, $kind),
                }
            }
        }
    };
}

scalar_field!(bool, ValueKind::Bool, Value::as_bool, Value::Bool);
scalar_field!(i32, ValueKind::Int32, Value::as_i32, Value::Int32);
scalar_field!(i64, ValueKind::Int64, Value::as_i64, Value::Int64);
scalar_field!(f64, ValueKind::Double, Value::as_f64, Value::Double);
scalar_field!(Timestamp, ValueKind::Date, Value::as_date, Value::Date);
scalar_field!(EntityId, ValueKind::Id, Value::as_id, Value::Id);
scalar_field!(
    String,
    ValueKind::Text,
    |v: &Value| v.as_text().map(str::to_string),
    Value::Text
);
scalar_field!(
    Document,
    ValueKind::Document,
    |v: &Value| v.as_document().cloned(),
    Value::Document
);
scalar_field!(
    Regex,
    ValueKind::Regex,
    |v: &Value| match v {
        Value::Regex(r) => Some(r.clone()),
        _ => None,
    },
    Value::Regex
);

/// A byte string field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Binary(pub Vec<u8>);

impl FieldValue for Binary {
    fn encode(&self) -> Value {
        Value::Bytes(self.0.clone())
    }

    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
        let v = present(value, path, ValueKind::Bytes)?;
        match v.as_bytes() {
            Some(bytes) => Ok(Binary(bytes.to_vec())),
            None => mismatch(v, path, ValueKind::Bytes),
        }
    }
}

impl FieldValue for Value {
    fn encode(&self) -> Value {
        self.clone()
    }

    fn decode(value: Option<&Value>, _path: &FieldPath) -> CodecResult<Self> {
        Ok(value.cloned().unwrap_or(Value::Null))
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn encode(&self) -> Value {
        match self {
            Some(v) => v.encode(),
            None => Value::Null,
        }
    }

    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(v) => T::decode(Some(v), path).map(Some),
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn encode(&self) -> Value {
        Value::Array(self.iter().map(FieldValue::encode).collect())
    }

    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
        let v = present(value, path, ValueKind::Array)?;
        let Some(items) = v.as_array() else {
            return mismatch(v, path, ValueKind::Array);
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| T::decode(Some(item), &path.index(i)))
            .collect()
    }
}

impl<T: FieldValue> FieldValue for BTreeMap<String, T> {
    fn encode(&self) -> Value {
        Value::Document(self.iter().map(|(k, v)| (k.clone(), v.encode())).collect())
    }

    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
        let v = present(value, path, ValueKind::Document)?;
        let Some(doc) = v.as_document() else {
            return mismatch(v, path, ValueKind::Document);
        };
        doc.iter()
            .map(|(k, item)| Ok((k.to_string(), T::decode(Some(item), &path.child(k))?)))
            .collect()
    }
}

fn tuple_items<'a>(
    value: Option<&'a Value>,
    path: &FieldPath,
    arity: usize,
) -> CodecResult<&'a [Value]> {
    let v = present(value, path, ValueKind::Array)?;
    let Some(items) = v.as_array() else {
        return mismatch(v, path, ValueKind::Array);
    };
    if items.len() != arity {
        return Err(CodecError::invalid_value(
            path,
            format!("expected {arity} components, found {}", items.len()),
        ));
    }
    Ok(items)
}

impl<A: FieldValue, B: FieldValue> FieldValue for (A, B) {
    fn encode(&self) -> Value {
        Value::Array(vec![self.0.encode(), self.1.encode()])
    }

    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
        let items = tuple_items(value, path, 2)?;
        Ok((
            A::decode(items.first(), &path.component(0))?,
            B::decode(items.get(1), &path.component(1))?,
        ))
    }
}

impl<A: FieldValue, B: FieldValue, C: FieldValue> FieldValue for (A, B, C) {
    fn encode(&self) -> Value {
        Value::Array(vec![self.0.encode(), self.1.encode(), self.2.encode()])
    }

    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
        let items = tuple_items(value, path, 3)?;
        Ok((
            A::decode(items.first(), &path.component(0))?,
            B::decode(items.get(1), &path.component(1))?,
            C::decode(items.get(2), &path.component(2))?,
        ))
    }
}

/// A string-tagged enumeration.
///
/// Implement this for fieldless enums and forward their [`FieldValue`]
/// impl to [`encode_enum`] / [`decode_enum`].
pub trait EnumCases: Sized + Copy + PartialEq + 'static {
    /// Name reported in [`CodecError::UnknownEnumCase`].
    const NAME: &'static str;
    /// Every case with its stored tag.
    const CASES: &'static [(&'static str, Self)];
}

/// Encodes an enum case as its string tag.
pub fn encode_enum<E: EnumCases>(value: &E) -> Value {
    E::CASES
        .iter()
        .find(|(_, case)| case == value)
        .map_or(Value::Null, |(tag, _)| Value::Text((*tag).to_string()))
}

/// Decodes an enum case from its string tag.
pub fn decode_enum<E: EnumCases>(value: Option<&Value>, path: &FieldPath) -> CodecResult<E> {
    let v = present(value, path, ValueKind::Text)?;
    let Some(tag) = v.as_text() else {
        return mismatch(v, path, ValueKind::Text);
    };
    E::CASES
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, case)| *case)
        .ok_or_else(|| CodecError::unknown_enum_case(E::NAME, tag))
}

/// Reads typed fields out of a document, tracking the path for errors.
///
/// ```
/// use docmap_codec::{doc, DocumentReader};
///
/// let d = doc! { "name" => "Alice", "age" => 30 };
/// let reader = DocumentReader::new(&d);
/// let age: i32 = reader.field("age").unwrap();
/// assert_eq!(age, 30);
/// assert!(reader.field::<String>("email").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct DocumentReader<'a> {
    doc: &'a Document,
    path: FieldPath,
}

impl<'a> DocumentReader<'a> {
    /// Reads from the document root.
    #[must_use]
    pub fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            path: FieldPath::root(),
        }
    }

    /// Reads an embedded record stored at `path`.
    pub fn embedded(value: Option<&'a Value>, path: &FieldPath) -> CodecResult<Self> {
        let v = present(value, path, ValueKind::Document)?;
        match v.as_document() {
            Some(doc) => Ok(Self {
                doc,
                path: path.clone(),
            }),
            None => mismatch(v, path, ValueKind::Document),
        }
    }

    /// Decodes a field of this record.
    pub fn field<T: FieldValue>(&self, key: &str) -> CodecResult<T> {
        T::decode(self.doc.get(key), &self.path.child(key))
    }

    /// Path of this record inside the root document.
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// The underlying document.
    pub fn document(&self) -> &'a Document {
        self.doc
    }
}

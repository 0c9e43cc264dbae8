//! Per-model schema descriptors.
//!
//! A [`Schema`] lists every field a model stores, with its kind. Reference
//! fields carry their target model and [`DeleteRule`]; the reference graph
//! and partial-update validation are driven entirely by these descriptors.

mod graph;
mod registry;

pub use graph::{DeleteAction, DeletionPlan};
pub use registry::{ModelEntry, Registry};

pub(crate) use graph::plan_deletion;

use crate::error::{CoreError, CoreResult};
use crate::types::ModelKey;
use docmap_codec::{CodecError, Document, FieldPath, Value, ValueKind};

/// What happens to a referencing entity when its target is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteRule {
    /// Deleting the target fails while the reference exists.
    Deny,
    /// Deleting the target first deletes the referencing entity.
    Cascade,
    /// No constraint.
    Ignore,
}

/// Whether a reference field holds one identifier or a list of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// A single identifier.
    One,
    /// An array of identifiers.
    Many,
}

/// The declared kind of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// 64-bit float.
    Double,
    /// Boolean.
    Bool,
    /// Timestamp.
    Date,
    /// Byte string.
    Bytes,
    /// Plain identifier without delete semantics.
    Id,
    /// Regular expression value.
    Regex,
    /// String-tagged enumeration with its allowed tags.
    Enum(&'static [&'static str]),
    /// Embedded record with its own fields.
    Embedded(Vec<FieldDescriptor>),
    /// Array of the inner kind.
    Array(Box<FieldKind>),
    /// The inner kind, or null / absent.
    Optional(Box<FieldKind>),
    /// Identifier of an entity of another model.
    Reference {
        /// Collection name of the target model.
        target: ModelKey,
        /// Rule applied when the target is deleted.
        rule: DeleteRule,
    },
    /// Any value; never validated.
    Any,
}

impl FieldKind {
    /// A reference to `target` governed by `rule`.
    #[must_use]
    pub const fn reference(target: ModelKey, rule: DeleteRule) -> Self {
        Self::Reference { target, rule }
    }

    /// An array of `inner`.
    #[must_use]
    pub fn array_of(inner: FieldKind) -> Self {
        Self::Array(Box::new(inner))
    }

    /// An optional `inner`.
    #[must_use]
    pub fn optional(inner: FieldKind) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// Checks that `value` can be stored in a field of this kind.
    pub fn check(&self, value: &Value, path: &FieldPath) -> Result<(), CodecError> {
        let expect = |kind: ValueKind| {
            if value.kind() == kind {
                Ok(())
            } else {
                Err(CodecError::type_mismatch(path, kind, Some(value.kind())))
            }
        };
        match self {
            Self::Any => Ok(()),
            Self::Text => expect(ValueKind::Text),
            Self::Int32 => expect(ValueKind::Int32),
            Self::Int64 => match value {
                Value::Int32(_) | Value::Int64(_) => Ok(()),
                _ => expect(ValueKind::Int64),
            },
            Self::Double => match value {
                Value::Int32(_) | Value::Int64(_) | Value::Double(_) => Ok(()),
                _ => expect(ValueKind::Double),
            },
            Self::Bool => expect(ValueKind::Bool),
            Self::Date => expect(ValueKind::Date),
            Self::Bytes => expect(ValueKind::Bytes),
            Self::Id | Self::Reference { .. } => expect(ValueKind::Id),
            Self::Regex => expect(ValueKind::Regex),
            Self::Enum(tags) => {
                expect(ValueKind::Text)?;
                match value.as_text() {
                    Some(tag) if tags.iter().any(|t| *t == tag) => Ok(()),
                    Some(tag) => Err(CodecError::invalid_value(
                        path,
                        format!("`{tag}` is not an allowed tag"),
                    )),
                    None => expect(ValueKind::Text),
                }
            }
            Self::Optional(inner) => match value {
                Value::Null => Ok(()),
                other => inner.check(other, path),
            },
            Self::Array(inner) => {
                let Some(items) = value.as_array() else {
                    return expect(ValueKind::Array);
                };
                for (index, item) in items.iter().enumerate() {
                    inner.check(item, &path.index(index))?;
                }
                Ok(())
            }
            Self::Embedded(fields) => {
                let Some(doc) = value.as_document() else {
                    return expect(ValueKind::Document);
                };
                for (key, item) in doc.iter() {
                    if let Some(field) = fields.iter().find(|f| f.name == key) {
                        field.kind.check(item, &path.child(key))?;
                    }
                }
                Ok(())
            }
        }
    }

    // Strips array/optional wrappers, reporting whether an array was crossed.
    fn unwrap_containers(&self) -> (&FieldKind, bool) {
        match self {
            Self::Array(inner) => (inner.unwrap_containers().0, true),
            Self::Optional(inner) => inner.unwrap_containers(),
            other => (other, false),
        }
    }
}

/// One declared field of a model or embedded record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Stored field name.
    pub name: &'static str,
    /// Declared kind.
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Creates a field descriptor.
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// A reference-typed field, flattened to its full dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceField {
    /// Dotted path from the document root.
    pub path: String,
    /// Collection name of the target model.
    pub target: ModelKey,
    /// Single identifier or array of identifiers.
    pub cardinality: Cardinality,
    /// Rule applied when the target is deleted.
    pub rule: DeleteRule,
}

/// The field layout of one model.
///
/// # Example
///
/// ```rust
/// use docmap_core::schema::{DeleteRule, FieldKind, Schema};
///
/// let schema = Schema::new("posts")
///     .field("title", FieldKind::Text)
///     .field("author", FieldKind::reference("users", DeleteRule::Cascade));
/// assert_eq!(schema.reference_fields()[0].path, "author");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    model: ModelKey,
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Creates an empty schema for the model stored in `model`.
    #[must_use]
    pub fn new(model: ModelKey) -> Self {
        Self {
            model,
            fields: Vec::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor::new(name, kind));
        self
    }

    /// The model's collection name.
    #[must_use]
    pub fn model(&self) -> ModelKey {
        self.model
    }

    /// The top-level fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Every reference field, embedded records included.
    #[must_use]
    pub fn reference_fields(&self) -> Vec<ReferenceField> {
        let mut out = Vec::new();
        collect_references(&self.fields, "", false, &mut out);
        out
    }

    /// Resolves a dotted path to its declared kind.
    ///
    /// Arrays and optionals are looked through, so `comments.author`
    /// resolves inside an array of embedded records.
    #[must_use]
    pub fn field_kind(&self, path: &str) -> Option<&FieldKind> {
        let mut fields = self.fields.as_slice();
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let field = fields.iter().find(|f| f.name == segment)?;
            if segments.peek().is_none() {
                return Some(&field.kind);
            }
            match field.kind.unwrap_containers().0 {
                FieldKind::Embedded(inner) => fields = inner,
                _ => return None,
            }
        }
        None
    }

    /// Validates the fields of a partial update.
    ///
    /// Every key is a dotted path that must name a declared field, and its
    /// value must fit the declared kind. The identifier cannot be patched.
    pub fn check_partial(&self, set: &Document) -> CoreResult<()> {
        for (path, value) in set.iter() {
            let Some(kind) = self.field_kind(path) else {
                return Err(CoreError::UnknownField {
                    model: self.model.to_string(),
                    field: path.to_string(),
                });
            };
            kind.check(value, &FieldPath::new(path))?;
        }
        Ok(())
    }
}

fn collect_references(
    fields: &[FieldDescriptor],
    prefix: &str,
    in_array: bool,
    out: &mut Vec<ReferenceField>,
) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };
        let (kind, crossed_array) = field.kind.unwrap_containers();
        let many = in_array || crossed_array;
        match kind {
            FieldKind::Reference { target, rule } => out.push(ReferenceField {
                path,
                target: *target,
                cardinality: if many {
                    Cardinality::Many
                } else {
                    Cardinality::One
                },
                rule: *rule,
            }),
            FieldKind::Embedded(inner) => collect_references(inner, &path, many, out),
            _ => {}
        }
    }
}

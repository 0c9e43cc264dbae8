//! Ordered documents.

use crate::id::EntityId;
use crate::value::Value;

/// The reserved key holding a document's identifier.
pub const ID_KEY: &str = "_id";

/// An ordered map of field names to values.
///
/// Insertion order is preserved; replacing an existing key keeps its
/// position. Canonical encoding sorts keys, so order never affects the
/// content hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty document with room for `capacity` fields.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Looks up a top-level field mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns true if the top-level field exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces a top-level field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Removes a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterates over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Returns the `_id` field if it holds an identifier.
    pub fn id(&self) -> Option<EntityId> {
        self.get(ID_KEY).and_then(Value::as_id)
    }

    /// Looks up a dotted path through embedded documents.
    ///
    /// Numeric segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets a dotted path, creating intermediate documents as needed.
    ///
    /// Returns false if an intermediate segment exists but is not a document.
    pub fn set_path(&mut self, path: &str, value: Value) -> bool {
        match path.split_once('.') {
            None => {
                self.insert(path, value);
                true
            }
            Some((head, rest)) => {
                if !self.contains_key(head) {
                    self.insert(head, Document::new());
                }
                match self.get_mut(head) {
                    Some(Value::Document(inner)) => inner.set_path(rest, value),
                    _ => false,
                }
            }
        }
    }

    /// Removes a dotted path, returning the removed value.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        match path.split_once('.') {
            None => self.remove(path),
            Some((head, rest)) => match self.get_mut(head)? {
                Value::Document(inner) => inner.remove_path(rest),
                _ => None,
            },
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Builds a [`Document`] from `key => value` pairs.
///
/// ```
/// use docmap_codec::{doc, Value};
///
/// let d = doc! { "name" => "Alice", "age" => 30 };
/// assert_eq!(d.get("age"), Some(&Value::Int32(30)));
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut d = $crate::Document::new();
        $( d.insert($key, $crate::Value::from($value)); )+
        d
    }};
}

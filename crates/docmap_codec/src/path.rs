//! Field paths.

use std::fmt;

/// A location inside a document, used for error context and for query
/// field references.
///
/// Paths are composed with dot notation for embedded fields (`address.city`),
/// `[n]` for array elements and `.n` for tuple components:
///
/// ```
/// use docmap_codec::FieldPath;
///
/// let path = FieldPath::root().child("tags").index(2);
/// assert_eq!(path.as_str(), "tags[2]");
/// assert_eq!(FieldPath::new("pair").component(0).as_str(), "pair.0");
/// ```
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    /// The empty path (the document itself).
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Creates a path from a dotted string.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns true for the document root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends an embedded field name.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{name}", self.0))
        }
    }

    /// Appends an array index.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{index}]", self.0))
    }

    /// Appends a tuple component.
    #[must_use]
    pub fn component(&self, index: usize) -> Self {
        self.child(&index.to_string())
    }

    /// Prefixes this path with another one.
    #[must_use]
    pub fn prefixed(&self, prefix: &FieldPath) -> Self {
        if prefix.is_root() {
            self.clone()
        } else if self.is_root() {
            prefix.clone()
        } else {
            Self(format!("{}.{}", prefix.0, self.0))
        }
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the path into its dotted segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|s| !s.is_empty())
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({})", self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_of_root_has_no_dot() {
        assert_eq!(FieldPath::root().child("name").as_str(), "name");
    }

    #[test]
    fn nested_paths() {
        let path = FieldPath::new("address").child("geo").child("lat");
        assert_eq!(path.as_str(), "address.geo.lat");
        assert_eq!(path.segments().collect::<Vec<_>>(), ["address", "geo", "lat"]);
    }

    #[test]
    fn prefixing() {
        let inner = FieldPath::new("author");
        assert_eq!(inner.prefixed(&FieldPath::new("post")).as_str(), "post.author");
        assert_eq!(inner.prefixed(&FieldPath::root()), inner);
    }

    #[test]
    fn display_root() {
        assert_eq!(FieldPath::root().to_string(), "<root>");
    }
}

//! Typed field proxies.
//!
//! A [`Field<E, T>`] stands for the field of model `E` holding values of
//! type `T`. Only operators that make sense for `T` are available, so a
//! filter on a misspelled field or with a wrongly typed constant does not
//! compile. Models expose their proxies from a plain struct:
//!
//! ```rust,ignore
//! pub struct UserFields {
//!     pub name: Field<User, String>,
//!     pub age: Field<User, i32>,
//! }
//!
//! let adults = users.find(&User::fields().age.gte(&18))?;
//! ```

use crate::collection::Model;
use crate::entity::{Handle, Reference};
use crate::query::expr::{Comparison, Direction, Expr, SortKey};
use crate::query::Query;
use docmap_codec::{EntityId, FieldValue, Regex, Timestamp, ID_KEY};
use std::marker::PhantomData;

/// A typed proxy for one field path of model `E`.
pub struct Field<E, T> {
    path: String,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E, T> Field<E, T> {
    /// A top-level field.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            path: name.to_string(),
            _marker: PhantomData,
        }
    }

    /// A field of an embedded record stored at `prefix`.
    #[must_use]
    pub fn nested(prefix: &str, name: &str) -> Self {
        if prefix.is_empty() {
            Self::new(name)
        } else {
            Self::new(&format!("{prefix}.{name}"))
        }
    }

    /// The full dotted path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Sorts smallest first by this field.
    #[must_use]
    pub fn ascending(&self) -> SortKey {
        SortKey {
            path: self.path.clone(),
            direction: Direction::Ascending,
        }
    }

    /// Sorts largest first by this field.
    #[must_use]
    pub fn descending(&self) -> SortKey {
        SortKey {
            path: self.path.clone(),
            direction: Direction::Descending,
        }
    }

    fn compare(&self, op: Comparison, value: docmap_codec::Value) -> Query<E> {
        Query::from_expr(Expr::Compare {
            path: self.path.clone(),
            op,
            value,
        })
    }
}

impl<E> Field<E, EntityId> {
    /// The identifier field.
    #[must_use]
    pub fn id() -> Self {
        Self::new(ID_KEY)
    }
}

impl<E, T: FieldValue> Field<E, T> {
    /// Field equals `value`.
    #[must_use]
    pub fn eq(&self, value: &T) -> Query<E> {
        self.compare(Comparison::Eq, value.encode())
    }

    /// Field differs from `value`.
    #[must_use]
    pub fn ne(&self, value: &T) -> Query<E> {
        self.compare(Comparison::Ne, value.encode())
    }

    /// Field equals one of `values`.
    #[must_use]
    pub fn is_in<'a>(&self, values: impl IntoIterator<Item = &'a T>) -> Query<E>
    where
        T: 'a,
    {
        Query::from_expr(Expr::In {
            path: self.path.clone(),
            values: values.into_iter().map(|v| v.encode()).collect(),
        })
    }
}

/// Field types with a meaningful order.
pub trait Ordered: FieldValue {}

impl Ordered for i32 {}
impl Ordered for i64 {}
impl Ordered for f64 {}
impl Ordered for Timestamp {}
impl<T: Ordered> Ordered for Option<T> {}

impl<E, T: Ordered> Field<E, T> {
    /// Field is greater than `value`.
    #[must_use]
    pub fn gt(&self, value: &T) -> Query<E> {
        self.compare(Comparison::Gt, value.encode())
    }

    /// Field is greater than or equal to `value`.
    #[must_use]
    pub fn gte(&self, value: &T) -> Query<E> {
        self.compare(Comparison::Gte, value.encode())
    }

    /// Field is less than `value`.
    #[must_use]
    pub fn lt(&self, value: &T) -> Query<E> {
        self.compare(Comparison::Lt, value.encode())
    }

    /// Field is less than or equal to `value`.
    #[must_use]
    pub fn lte(&self, value: &T) -> Query<E> {
        self.compare(Comparison::Lte, value.encode())
    }
}

/// Field types holding text.
pub trait Textual: FieldValue {}

impl Textual for String {}
impl Textual for Option<String> {}

impl<E, T: Textual> Field<E, T> {
    /// Text starts with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> Query<E> {
        self.matches(format!("^{}", Regex::escape(prefix)), "")
    }

    /// Text ends with `suffix`.
    #[must_use]
    pub fn ends_with(&self, suffix: &str) -> Query<E> {
        self.matches(format!("{}$", Regex::escape(suffix)), "")
    }

    /// Text contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> Query<E> {
        self.matches(Regex::escape(needle), "")
    }

    /// Text contains `needle`, ignoring case.
    #[must_use]
    pub fn contains_ignoring_case(&self, needle: &str) -> Query<E> {
        self.matches(Regex::escape(needle), "i")
    }

    fn matches(&self, pattern: String, options: &str) -> Query<E> {
        Query::from_expr(Expr::Matches {
            path: self.path.clone(),
            regex: Regex::new(pattern, options),
        })
    }
}

impl<E, R: Model> Field<E, Reference<R>> {
    /// The reference points at `target`.
    ///
    /// Compares identifiers only; the target does not need to be loaded.
    #[must_use]
    pub fn is(&self, target: &Handle<R>) -> Query<E> {
        self.is_id(target.id())
    }

    /// The reference points at `id`.
    #[must_use]
    pub fn is_id(&self, id: EntityId) -> Query<E> {
        self.compare(Comparison::Eq, docmap_codec::Value::Id(id))
    }
}

impl<E, R: Model> Field<E, Option<Reference<R>>> {
    /// The reference is set and points at `target`.
    #[must_use]
    pub fn is(&self, target: &Handle<R>) -> Query<E> {
        self.compare(Comparison::Eq, docmap_codec::Value::Id(target.id()))
    }
}

impl<E, R: Model> Field<E, Vec<Reference<R>>> {
    /// One of the references points at `target`.
    #[must_use]
    pub fn includes(&self, target: &Handle<R>) -> Query<E> {
        self.compare(Comparison::Eq, docmap_codec::Value::Id(target.id()))
    }
}

impl<E, T: FieldValue> Field<E, Vec<T>> {
    /// One of the elements equals `value`.
    #[must_use]
    pub fn has(&self, value: &T) -> Query<E> {
        self.compare(Comparison::Eq, value.encode())
    }

    /// The number of distinct elements, for comparison.
    #[must_use]
    pub fn distinct_count(&self) -> DistinctCount<E> {
        DistinctCount {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

/// The distinct element count of an array field.
///
/// Filters built from it are evaluated by an aggregation pipeline.
pub struct DistinctCount<E> {
    path: String,
    _marker: PhantomData<fn() -> E>,
}

impl<E> DistinctCount<E> {
    fn compare(&self, op: Comparison, count: i64) -> Query<E> {
        Query::from_expr(Expr::DistinctCount {
            path: self.path.clone(),
            op,
            count,
        })
    }

    /// Count equals `n`.
    #[must_use]
    pub fn eq(&self, n: i64) -> Query<E> {
        self.compare(Comparison::Eq, n)
    }

    /// Count is greater than `n`.
    #[must_use]
    pub fn gt(&self, n: i64) -> Query<E> {
        self.compare(Comparison::Gt, n)
    }

    /// Count is greater than or equal to `n`.
    #[must_use]
    pub fn gte(&self, n: i64) -> Query<E> {
        self.compare(Comparison::Gte, n)
    }

    /// Count is less than `n`.
    #[must_use]
    pub fn lt(&self, n: i64) -> Query<E> {
        self.compare(Comparison::Lt, n)
    }

    /// Count is less than or equal to `n`.
    #[must_use]
    pub fn lte(&self, n: i64) -> Query<E> {
        self.compare(Comparison::Lte, n)
    }
}

impl<E, T> Clone for Field<E, T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E, T> std::fmt::Debug for Field<E, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field({})", self.path)
    }
}

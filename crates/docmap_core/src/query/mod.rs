//! Typed queries.
//!
//! Queries are built from [`Field`] proxies and combined with `&`, `|` and
//! `!`. A query carries its own ordering and window:
//!
//! ```rust,ignore
//! let f = User::fields();
//! let query = (f.age.gte(&18) & !f.name.starts_with("test"))
//!     .sort_by(f.age.descending())
//!     .limit(10);
//! let users = db.collection::<User>()?.find(&query)?;
//! ```

mod expr;
mod field;
mod prepared;

pub use expr::{Comparison, Direction, Expr, SortKey};
pub use field::{DistinctCount, Field, Ordered, Textual};
pub use prepared::PreparedQuery;

pub(crate) use prepared::{strip_synthetic, COUNT_FIELD};

use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, Not};

/// A filter over model `E`, with ordering and a result window.
pub struct Query<E> {
    expr: Option<Expr>,
    sort: Vec<SortKey>,
    skip: Option<u64>,
    limit: Option<u64>,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Query<E> {
    /// Matches every entity.
    #[must_use]
    pub fn all() -> Self {
        Self {
            expr: None,
            sort: Vec::new(),
            skip: None,
            limit: None,
            _marker: PhantomData,
        }
    }

    /// Wraps a raw expression.
    #[must_use]
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            expr: Some(expr),
            ..Self::all()
        }
    }

    /// Both queries hold. Ordering and window come from `self`.
    #[must_use]
    pub fn and(self, other: Query<E>) -> Self {
        let expr = match (self.expr, other.expr) {
            (None, e) | (e, None) => e,
            (Some(Expr::And(mut left)), Some(Expr::And(right))) => {
                left.extend(right);
                Some(Expr::And(left))
            }
            (Some(Expr::And(mut left)), Some(right)) => {
                left.push(right);
                Some(Expr::And(left))
            }
            (Some(left), Some(right)) => Some(Expr::And(vec![left, right])),
        };
        Self { expr, ..self }
    }

    /// Either query holds. Ordering and window come from `self`.
    ///
    /// An unfiltered side matches everything, so the result does too.
    #[must_use]
    pub fn or(self, other: Query<E>) -> Self {
        let expr = match (self.expr, other.expr) {
            (Some(Expr::Or(mut left)), Some(right)) => {
                left.push(right);
                Some(Expr::Or(left))
            }
            (Some(left), Some(right)) => Some(Expr::Or(vec![left, right])),
            _ => None,
        };
        Self { expr, ..self }
    }

    /// Negates the filter.
    ///
    /// Negating the unfiltered query matches nothing.
    #[must_use]
    pub fn negate(self) -> Self {
        let inner = self.expr.unwrap_or(Expr::And(Vec::new()));
        let expr = match inner {
            Expr::Not(inner) => *inner,
            other => Expr::Not(Box::new(other)),
        };
        Self {
            expr: Some(expr),
            ..self
        }
    }

    /// Appends a sort key; earlier keys take precedence.
    #[must_use]
    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Skips the first `n` results.
    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Returns at most `n` results. Zero means no limit.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// The filter expression, `None` for an unfiltered query.
    #[must_use]
    pub fn expr(&self) -> Option<&Expr> {
        self.expr.as_ref()
    }

    /// The sort keys.
    #[must_use]
    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    /// The number of skipped results.
    #[must_use]
    pub fn skipped(&self) -> Option<u64> {
        self.skip
    }

    /// The result limit.
    #[must_use]
    pub fn limited(&self) -> Option<u64> {
        self.limit
    }

    /// Lowers the query to a store request.
    #[must_use]
    pub fn prepare(&self) -> PreparedQuery {
        PreparedQuery::new(self.expr.as_ref(), &self.sort, self.skip, self.limit)
    }
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
            _marker: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("expr", &self.expr)
            .field("sort", &self.sort)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<E> Default for Query<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E> BitAnd for Query<E> {
    type Output = Query<E>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl<E> BitOr for Query<E> {
    type Output = Query<E>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl<E> Not for Query<E> {
    type Output = Query<E>;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_codec::{doc, Document};
    use docmap_store::{matches, FindRequest};

    struct Person;

    fn age() -> Field<Person, i32> {
        Field::new("age")
    }

    fn name() -> Field<Person, String> {
        Field::new("name")
    }

    fn filter(query: &Query<Person>) -> Document {
        match query.prepare() {
            PreparedQuery::Find(FindRequest { filter, .. }) => filter,
            PreparedQuery::Aggregate { .. } => panic!("expected a find"),
        }
    }

    #[test]
    fn conjunctions_flatten() {
        let q = age().gt(&1) & age().lt(&9) & name().eq(&"x".to_string());
        let Some(Expr::And(items)) = q.expr() else {
            panic!("expected a conjunction");
        };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn all_is_neutral_for_and() {
        let q = Query::all() & age().eq(&3);
        assert_eq!(filter(&q), doc! { "age" => doc! { "$eq" => 3 } });
    }

    #[test]
    fn all_absorbs_or() {
        let q = Query::all() | age().eq(&3);
        assert!(q.expr().is_none());
    }

    #[test]
    fn double_negation_cancels() {
        let q = !!age().eq(&3);
        assert_eq!(filter(&q), doc! { "age" => doc! { "$eq" => 3 } });
    }

    #[test]
    fn negated_all_matches_nothing() {
        let q: Query<Person> = !Query::all();
        let f = filter(&q);
        assert!(!matches(&doc! { "age" => 1 }, &f).unwrap());
    }

    #[test]
    fn lowered_filters_evaluate() {
        let q = (age().gte(&18) & !name().starts_with("test")) | name().eq(&"root".to_string());
        let f = filter(&q);
        assert!(matches(&doc! { "age" => 20, "name" => "alice" }, &f).unwrap());
        assert!(!matches(&doc! { "age" => 20, "name" => "tester" }, &f).unwrap());
        assert!(!matches(&doc! { "age" => 10, "name" => "bob" }, &f).unwrap());
        assert!(matches(&doc! { "age" => 10, "name" => "root" }, &f).unwrap());
    }

    #[test]
    fn ordering_and_window_survive_combination() {
        let q = age().gt(&1).sort_by(age().descending()).skip(2).limit(3) & name().eq(&"a".to_string());
        assert_eq!(q.sort_keys(), [age().descending()]);
        assert_eq!(q.skipped(), Some(2));
        assert_eq!(q.limited(), Some(3));
        assert!(matches!(q.prepare(), PreparedQuery::Find(FindRequest { limit: Some(3), .. })));
    }
}

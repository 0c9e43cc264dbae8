//! Backend-agnostic query expressions.

use docmap_codec::{Document, Regex, Value, ID_KEY};

/// Comparison applied to a field value or a computed count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl Comparison {
    fn operator(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

/// A predicate tree over field paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Compares the value at `path` with a constant.
    Compare {
        /// Dotted field path.
        path: String,
        /// The comparison.
        op: Comparison,
        /// Right-hand side.
        value: Value,
    },
    /// The value at `path` equals one of `values`.
    In {
        /// Dotted field path.
        path: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// The text at `path` matches a regular expression.
    Matches {
        /// Dotted field path.
        path: String,
        /// The pattern.
        regex: Regex,
    },
    /// The number of distinct values at `path` compared with `count`.
    ///
    /// Only an aggregation pipeline can evaluate this.
    DistinctCount {
        /// Dotted path of an array field.
        path: String,
        /// The comparison.
        op: Comparison,
        /// Right-hand side.
        count: i64,
    },
    /// Every operand holds.
    And(Vec<Expr>),
    /// At least one operand holds.
    Or(Vec<Expr>),
    /// The operand does not hold.
    Not(Box<Expr>),
}

impl Expr {
    /// Returns true if evaluating the expression needs a pipeline.
    #[must_use]
    pub fn needs_pipeline(&self) -> bool {
        match self {
            Self::DistinctCount { .. } => true,
            Self::And(items) | Self::Or(items) => items.iter().any(Expr::needs_pipeline),
            Self::Not(inner) => inner.needs_pipeline(),
            _ => false,
        }
    }

    /// If the expression is exactly an equality on `_id`, returns the value.
    #[must_use]
    pub fn identifier_equality(&self) -> Option<&Value> {
        match self {
            Self::Compare {
                path,
                op: Comparison::Eq,
                value,
            } if path == ID_KEY => Some(value),
            _ => None,
        }
    }

    /// Lowers the expression to a store filter document.
    ///
    /// `DistinctCount` nodes read the count from the field named by
    /// `count_field`, which the pipeline fills in beforehand.
    pub(crate) fn to_filter(&self, count_field: &mut dyn FnMut(&str) -> String) -> Document {
        let mut filter = Document::new();
        match self {
            Self::Compare { path, op, value } => {
                filter.insert(path.as_str(), operator(op.operator(), value.clone()));
            }
            Self::In { path, values } => {
                filter.insert(path.as_str(), operator("$in", Value::Array(values.clone())));
            }
            Self::Matches { path, regex } => {
                filter.insert(path.as_str(), operator("$regex", Value::Regex(regex.clone())));
            }
            Self::DistinctCount { path, op, count } => {
                let field = count_field(path);
                filter.insert(field, operator(op.operator(), Value::Int64(*count)));
            }
            Self::And(items) => {
                filter.insert("$and", lower_all(items, count_field));
            }
            Self::Or(items) => {
                filter.insert("$or", lower_all(items, count_field));
            }
            Self::Not(inner) => {
                filter.insert("$nor", Value::Array(vec![Value::Document(inner.to_filter(count_field))]));
            }
        }
        filter
    }

    /// Visits every `DistinctCount` path, outermost first.
    pub(crate) fn distinct_count_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::DistinctCount { path, .. } => {
                if !out.contains(&path.as_str()) {
                    out.push(path);
                }
            }
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.distinct_count_paths(out);
                }
            }
            Self::Not(inner) => inner.distinct_count_paths(out),
            _ => {}
        }
    }
}

fn operator(name: &str, value: Value) -> Value {
    let mut doc = Document::new();
    doc.insert(name, value);
    Value::Document(doc)
}

fn lower_all(items: &[Expr], count_field: &mut dyn FnMut(&str) -> String) -> Value {
    Value::Array(
        items
            .iter()
            .map(|item| Value::Document(item.to_filter(count_field)))
            .collect(),
    )
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    /// Dotted field path.
    pub path: String,
    /// Direction.
    pub direction: Direction,
}

/// Lowers sort keys to a `{field: 1 | -1}` document.
pub(crate) fn sort_document(keys: &[SortKey]) -> Document {
    keys.iter()
        .map(|key| {
            let direction = match key.direction {
                Direction::Ascending => 1,
                Direction::Descending => -1,
            };
            (key.path.clone(), Value::Int32(direction))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_codec::doc;

    fn no_counts(_: &str) -> String {
        unreachable!("no distinct counts in this expression")
    }

    #[test]
    fn lowers_comparisons() {
        let expr = Expr::And(vec![
            Expr::Compare {
                path: "age".into(),
                op: Comparison::Gte,
                value: Value::Int32(18),
            },
            Expr::Not(Box::new(Expr::In {
                path: "name".into(),
                values: vec![Value::from("root")],
            })),
        ]);
        let filter = expr.to_filter(&mut no_counts);
        let expected = doc! {
            "$and" => vec![
                Value::from(doc! { "age" => doc! { "$gte" => 18 } }),
                Value::from(doc! { "$nor" => vec![
                    Value::from(doc! { "name" => doc! { "$in" => vec![Value::from("root")] } }),
                ] }),
            ],
        };
        assert_eq!(filter, expected);
    }

    #[test]
    fn pipeline_detection() {
        let plain = Expr::Compare {
            path: "a".into(),
            op: Comparison::Eq,
            value: Value::Int32(1),
        };
        assert!(!plain.needs_pipeline());
        let counted = Expr::Or(vec![
            plain,
            Expr::DistinctCount {
                path: "tags".into(),
                op: Comparison::Gt,
                count: 2,
            },
        ]);
        assert!(counted.needs_pipeline());

        let mut paths = Vec::new();
        counted.distinct_count_paths(&mut paths);
        assert_eq!(paths, ["tags"]);
    }

    #[test]
    fn identifier_equality_only_for_plain_id_match() {
        let id = docmap_codec::EntityId::new();
        let by_id = Expr::Compare {
            path: ID_KEY.into(),
            op: Comparison::Eq,
            value: Value::Id(id),
        };
        assert_eq!(by_id.identifier_equality(), Some(&Value::Id(id)));
        let wrapped = Expr::And(vec![by_id]);
        assert_eq!(wrapped.identifier_equality(), None);
    }

    #[test]
    fn sort_keys_lower_in_order() {
        let keys = vec![
            SortKey {
                path: "age".into(),
                direction: Direction::Descending,
            },
            SortKey {
                path: "name".into(),
                direction: Direction::Ascending,
            },
        ];
        assert_eq!(sort_document(&keys), doc! { "age" => -1, "name" => 1 });
    }
}

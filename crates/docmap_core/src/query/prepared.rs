//! Lowering of queries to store requests.
//!
//! Plain filters become a single `find`. A filter that compares distinct
//! counts becomes a pipeline: one `DistinctCount` stage per counted path
//! writes a synthetic field, then the lowered filter matches on it.
//! Synthetic fields are stripped before documents are decoded.

use crate::query::expr::{sort_document, Expr, SortKey};
use docmap_codec::Document;
use docmap_store::{FindRequest, Stage};

/// Field written by the trailing count stage.
pub(crate) const COUNT_FIELD: &str = "count";

const DISTINCT_PREFIX: &str = "__distinct_";

/// A query ready to run against a store.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedQuery {
    /// A filtered scan.
    Find(FindRequest),
    /// An aggregation pipeline.
    Aggregate {
        /// The stages, in order.
        stages: Vec<Stage>,
        /// Fields added by the pipeline that are not part of the model.
        synthetic: Vec<String>,
    },
}

impl PreparedQuery {
    /// Builds the request for `expr` with the given ordering and window.
    ///
    /// A zero `limit` means no limit.
    #[must_use]
    pub fn new(expr: Option<&Expr>, sort: &[SortKey], skip: Option<u64>, limit: Option<u64>) -> Self {
        let limit = limit.filter(|n| *n > 0);
        match expr {
            Some(expr) if expr.needs_pipeline() => Self::pipeline(expr, sort, skip, limit),
            _ => {
                let filter = expr.map_or_else(Document::new, |e| e.to_filter(&mut unreachable_count));
                let mut request = FindRequest::new(filter);
                if !sort.is_empty() {
                    request = request.sort(sort_document(sort));
                }
                request.skip = skip;
                request.limit = limit;
                Self::Find(request)
            }
        }
    }

    fn pipeline(expr: &Expr, sort: &[SortKey], skip: Option<u64>, limit: Option<u64>) -> Self {
        let mut paths = Vec::new();
        expr.distinct_count_paths(&mut paths);
        let synthetic: Vec<String> = (0..paths.len())
            .map(|n| format!("{DISTINCT_PREFIX}{n}"))
            .collect();

        let mut stages: Vec<Stage> = paths
            .iter()
            .zip(&synthetic)
            .map(|(path, into)| Stage::DistinctCount {
                path: (*path).to_string(),
                into: into.clone(),
            })
            .collect();

        let mut count_field = |path: &str| {
            let position = paths.iter().position(|p| *p == path).unwrap_or_default();
            synthetic[position].clone()
        };
        stages.push(Stage::Match(expr.to_filter(&mut count_field)));
        if !sort.is_empty() {
            stages.push(Stage::Sort(sort_document(sort)));
        }
        if let Some(n) = skip {
            stages.push(Stage::Skip(n));
        }
        if let Some(n) = limit {
            stages.push(Stage::Limit(n));
        }
        Self::Aggregate { stages, synthetic }
    }

    /// Returns true if the query runs as a pipeline.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate { .. })
    }

    /// Appends a count stage. Only meaningful for pipelines.
    pub(crate) fn counting(self) -> Self {
        match self {
            Self::Aggregate { mut stages, synthetic } => {
                stages.push(Stage::Count(COUNT_FIELD.to_string()));
                Self::Aggregate { stages, synthetic }
            }
            find @ Self::Find(_) => find,
        }
    }
}

// Plain filters never contain distinct counts.
fn unreachable_count(path: &str) -> String {
    path.to_string()
}

/// Removes pipeline-only fields from a result document.
pub(crate) fn strip_synthetic(doc: &mut Document, synthetic: &[String]) {
    for field in synthetic {
        doc.remove(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{Comparison, Direction};
    use docmap_codec::{doc, Value};

    fn age_over(n: i32) -> Expr {
        Expr::Compare {
            path: "age".into(),
            op: Comparison::Gt,
            value: Value::Int32(n),
        }
    }

    #[test]
    fn plain_filters_become_a_find() {
        let sort = [SortKey {
            path: "age".into(),
            direction: Direction::Descending,
        }];
        let prepared = PreparedQuery::new(Some(&age_over(30)), &sort, Some(2), Some(0));
        let PreparedQuery::Find(request) = prepared else {
            panic!("expected a find");
        };
        assert_eq!(request.filter, doc! { "age" => doc! { "$gt" => 30 } });
        assert_eq!(request.sort, Some(doc! { "age" => -1 }));
        assert_eq!(request.skip, Some(2));
        assert_eq!(request.limit, None);
    }

    #[test]
    fn no_filter_matches_everything() {
        let prepared = PreparedQuery::new(None, &[], None, None);
        assert_eq!(prepared, PreparedQuery::Find(FindRequest::new(Document::new())));
    }

    #[test]
    fn distinct_counts_become_a_pipeline() {
        let expr = Expr::And(vec![
            age_over(18),
            Expr::DistinctCount {
                path: "tags".into(),
                op: Comparison::Gte,
                count: 2,
            },
        ]);
        let prepared = PreparedQuery::new(Some(&expr), &[], None, Some(5)).counting();
        let PreparedQuery::Aggregate { stages, synthetic } = prepared else {
            panic!("expected a pipeline");
        };
        assert_eq!(synthetic, ["__distinct_0"]);
        assert_eq!(
            stages,
            vec![
                Stage::DistinctCount {
                    path: "tags".into(),
                    into: "__distinct_0".into(),
                },
                Stage::Match(doc! {
                    "$and" => vec![
                        Value::from(doc! { "age" => doc! { "$gt" => 18 } }),
                        Value::from(doc! { "__distinct_0" => doc! { "$gte" => 2i64 } }),
                    ],
                }),
                Stage::Limit(5),
                Stage::Count("count".into()),
            ]
        );
    }

    #[test]
    fn synthetic_fields_are_stripped() {
        let mut doc = doc! { "name" => "a", "__distinct_0" => 3i64 };
        strip_synthetic(&mut doc, &["__distinct_0".to_string()]);
        assert_eq!(doc, doc! { "name" => "a" });
    }
}

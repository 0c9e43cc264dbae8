//! Aggregation pipeline stages and sorting.

use crate::error::{StoreError, StoreResult};
use crate::filter::matches;
use docmap_codec::{Document, Value};
use std::cmp::Ordering;

/// One stage of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keeps documents matching the filter.
    Match(Document),
    /// Sorts by the given specification (`{field: 1 | -1}`).
    Sort(Document),
    /// Drops the first `n` documents.
    Skip(u64),
    /// Keeps at most `n` documents.
    Limit(u64),
    /// Replaces the stream with a single `{field: count}` document.
    ///
    /// An empty input produces an empty output.
    Count(String),
    /// Adds a field holding the number of distinct values found at `path`.
    ///
    /// Arrays count their distinct elements, a missing field counts as zero
    /// and any other value counts as one.
    DistinctCount {
        /// Path whose values are counted.
        path: String,
        /// Field receiving the count.
        into: String,
    },
}

/// Runs `stages` over `documents` in order.
pub(crate) fn run_pipeline(mut documents: Vec<Document>, stages: &[Stage]) -> StoreResult<Vec<Document>> {
    for stage in stages {
        documents = match stage {
            Stage::Match(filter) => {
                let mut kept = Vec::with_capacity(documents.len());
                for doc in documents {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            Stage::Sort(spec) => {
                sort_documents(&mut documents, spec)?;
                documents
            }
            Stage::Skip(n) => documents.into_iter().skip(to_usize(*n)).collect(),
            Stage::Limit(n) => documents.into_iter().take(to_usize(*n)).collect(),
            Stage::Count(field) => {
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut result = Document::new();
                    result.insert(field.clone(), Value::Int64(to_i64(documents.len())));
                    vec![result]
                }
            }
            Stage::DistinctCount { path, into } => documents
                .into_iter()
                .map(|mut doc| {
                    let count = distinct_count(&doc, path);
                    doc.insert(into.clone(), Value::Int64(to_i64(count)));
                    doc
                })
                .collect(),
        };
    }
    Ok(documents)
}

fn distinct_count(doc: &Document, path: &str) -> usize {
    match doc.get_path(path) {
        None => 0,
        Some(Value::Array(items)) => {
            let mut distinct: Vec<&Value> = Vec::with_capacity(items.len());
            for item in items {
                let seen_before = distinct
                    .iter()
                    .any(|seen| *seen == item || seen.compare(item) == Some(Ordering::Equal));
                if !seen_before {
                    distinct.push(item);
                }
            }
            distinct.len()
        }
        Some(_) => 1,
    }
}

/// Sorts documents in place by a `{field: 1 | -1}` specification.
pub(crate) fn sort_documents(documents: &mut [Document], spec: &Document) -> StoreResult<()> {
    let mut keys = Vec::with_capacity(spec.len());
    for (path, direction) in spec.iter() {
        let ascending = match direction.as_i64() {
            Some(1) => true,
            Some(-1) => false,
            _ => return Err(StoreError::invalid_filter(format!("invalid sort direction for {path}"))),
        };
        keys.push((path, ascending));
    }

    documents.sort_by(|a, b| {
        for (path, ascending) in &keys {
            let left = a.get_path(path).unwrap_or(&Value::Null);
            let right = b.get_path(path).unwrap_or(&Value::Null);
            let ordering = left.sort_cmp(right);
            if ordering != Ordering::Equal {
                return if *ascending { ordering } else { ordering.reverse() };
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_codec::doc;

    fn numbers() -> Vec<Document> {
        (1..=5).map(|n| doc! { "n" => n }).collect()
    }

    #[test]
    fn match_skip_limit() {
        let out = run_pipeline(
            numbers(),
            &[
                Stage::Match(doc! { "n" => doc! { "$gt" => 1 } }),
                Stage::Skip(1),
                Stage::Limit(2),
            ],
        )
        .unwrap();
        assert_eq!(out, vec![doc! { "n" => 3 }, doc! { "n" => 4 }]);
    }

    #[test]
    fn count_stage() {
        let out = run_pipeline(numbers(), &[Stage::Count("total".into())]).unwrap();
        assert_eq!(out, vec![doc! { "total" => 5i64 }]);
    }

    #[test]
    fn count_of_nothing_is_empty() {
        let out = run_pipeline(Vec::new(), &[Stage::Count("total".into())]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn distinct_count_stage() {
        let docs = vec![
            doc! { "tags" => vec![Value::from("a"), Value::from("b"), Value::from("a")] },
            doc! { "tags" => "solo" },
            doc! { "other" => 1 },
        ];
        let out = run_pipeline(
            docs,
            &[Stage::DistinctCount {
                path: "tags".into(),
                into: "n".into(),
            }],
        )
        .unwrap();
        let counts: Vec<_> = out.iter().map(|d| d.get("n").cloned()).collect();
        assert_eq!(
            counts,
            vec![
                Some(Value::Int64(2)),
                Some(Value::Int64(1)),
                Some(Value::Int64(0))
            ]
        );
    }

    #[test]
    fn sort_descending_with_missing_first_ascending() {
        let mut docs = vec![doc! { "n" => 2 }, doc! { "m" => 1 }, doc! { "n" => 9 }];
        sort_documents(&mut docs, &doc! { "n" => -1 }).unwrap();
        assert_eq!(docs[0], doc! { "n" => 9 });
        assert_eq!(docs[2], doc! { "m" => 1 });
    }

    #[test]
    fn invalid_sort_direction() {
        let mut docs = numbers();
        assert!(sort_documents(&mut docs, &doc! { "n" => 2 }).is_err());
    }
}

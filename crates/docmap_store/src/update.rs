//! Update document application.

use crate::error::{StoreError, StoreResult};
use docmap_codec::{Document, EntityId, Value, ID_KEY};

/// Applies `update` to `doc` in place.
///
/// A document without `$` keys replaces the stored one (keeping its `_id`);
/// otherwise every key must be one of `$set`, `$unset` or `$rename`.
/// Returns true if the document changed.
pub(crate) fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<bool> {
    let before = doc.clone();
    if is_replacement(update)? {
        let id = doc.get(ID_KEY).cloned();
        *doc = update.clone();
        if let Some(id) = id {
            doc.insert(ID_KEY, id);
        }
    } else {
        for (op, operand) in update.iter() {
            let fields = operand.as_document().ok_or_else(|| {
                StoreError::invalid_update(format!("{op} expects a document"))
            })?;
            match op {
                "$set" => {
                    for (path, value) in fields.iter() {
                        reject_id_change(path)?;
                        if !doc.set_path(path, value.clone()) {
                            return Err(StoreError::invalid_update(format!(
                                "cannot set {path} through a non-document"
                            )));
                        }
                    }
                }
                "$unset" => {
                    for path in fields.keys() {
                        reject_id_change(path)?;
                        doc.remove_path(path);
                    }
                }
                "$rename" => {
                    for (from, to) in fields.iter() {
                        let to = to.as_text().ok_or_else(|| {
                            StoreError::invalid_update("$rename target must be a string")
                        })?;
                        reject_id_change(from)?;
                        reject_id_change(to)?;
                        if let Some(value) = doc.remove_path(from) {
                            doc.set_path(to, value);
                        }
                    }
                }
                other => {
                    return Err(StoreError::invalid_update(format!(
                        "unknown update operator {other}"
                    )))
                }
            }
        }
    }
    Ok(*doc != before)
}

/// Builds the document inserted by an upsert that matched nothing.
///
/// Top-level equality conditions of the filter seed the new document, then
/// the update is applied. A fresh identifier is generated when neither
/// provides one.
pub(crate) fn upsert_document(filter: &Document, update: &Document) -> StoreResult<Document> {
    let mut doc = Document::new();
    if is_replacement(update)? {
        doc = update.clone();
        if !doc.contains_key(ID_KEY) {
            if let Some(id) = filter.get(ID_KEY) {
                doc.insert(ID_KEY, id.clone());
            }
        }
    } else {
        for (key, value) in filter.iter() {
            let is_operator = value
                .as_document()
                .and_then(|d| d.keys().next())
                .is_some_and(|k| k.starts_with('$'));
            if !key.starts_with('$') && !is_operator {
                doc.set_path(key, value.clone());
            }
        }
        apply_update(&mut doc, update)?;
    }
    if !doc.contains_key(ID_KEY) {
        doc.insert(ID_KEY, Value::Id(EntityId::new()));
    }
    Ok(doc)
}

fn is_replacement(update: &Document) -> StoreResult<bool> {
    let operators = update.keys().filter(|k| k.starts_with('$')).count();
    match operators {
        0 => Ok(true),
        n if n == update.len() => Ok(false),
        _ => Err(StoreError::invalid_update(
            "cannot mix operators and plain fields",
        )),
    }
}

fn reject_id_change(path: &str) -> StoreResult<()> {
    if path == ID_KEY {
        return Err(StoreError::invalid_update("the _id field is immutable"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_codec::doc;

    #[test]
    fn replacement_keeps_id() {
        let id = EntityId::new();
        let mut stored = doc! { ID_KEY => id, "name" => "old" };
        let changed = apply_update(&mut stored, &doc! { "name" => "new" }).unwrap();
        assert!(changed);
        assert_eq!(stored.id(), Some(id));
        assert_eq!(stored.get("name"), Some(&Value::from("new")));
    }

    #[test]
    fn identical_replacement_is_not_a_modification() {
        let id = EntityId::new();
        let mut stored = doc! { ID_KEY => id, "name" => "same" };
        let replacement = stored.clone();
        assert!(!apply_update(&mut stored, &replacement).unwrap());
    }

    #[test]
    fn operators() {
        let mut stored = doc! { "a" => 1, "b" => 2, "nested" => doc! { "c" => 3 } };
        let update = doc! {
            "$set" => doc! { "nested.d" => 4 },
            "$unset" => doc! { "b" => "" },
            "$rename" => doc! { "a" => "alpha" },
        };
        assert!(apply_update(&mut stored, &update).unwrap());
        assert_eq!(stored.get("alpha"), Some(&Value::Int32(1)));
        assert!(stored.get("a").is_none());
        assert!(stored.get("b").is_none());
        assert_eq!(stored.get_path("nested.d"), Some(&Value::Int32(4)));
    }

    #[test]
    fn rename_of_missing_field_is_noop() {
        let mut stored = doc! { "x" => 1 };
        let changed = apply_update(&mut stored, &doc! { "$rename" => doc! { "y" => "z" } }).unwrap();
        assert!(!changed);
    }

    #[test]
    fn mixed_update_rejected() {
        let mut stored = doc! { "x" => 1 };
        let update = doc! { "$set" => doc! { "x" => 2 }, "y" => 3 };
        assert!(apply_update(&mut stored, &update).is_err());
    }

    #[test]
    fn id_is_immutable() {
        let mut stored = doc! { ID_KEY => EntityId::new() };
        let update = doc! { "$set" => doc! { ID_KEY => EntityId::new() } };
        assert!(apply_update(&mut stored, &update).is_err());
    }

    #[test]
    fn upsert_seeds_from_filter() {
        let id = EntityId::new();
        let doc = upsert_document(
            &doc! { ID_KEY => id, "age" => doc! { "$gt" => 3 } },
            &doc! { "$set" => doc! { "name" => "n" } },
        )
        .unwrap();
        assert_eq!(doc.id(), Some(id));
        assert!(doc.get("age").is_none());
        assert_eq!(doc.get("name"), Some(&Value::from("n")));
    }

    #[test]
    fn upsert_replacement_takes_filter_id() {
        let id = EntityId::new();
        let doc = upsert_document(&doc! { ID_KEY => id }, &doc! { "name" => "n" }).unwrap();
        assert_eq!(doc.id(), Some(id));
    }
}

//! Property-based test generators using proptest.
//!
//! Provides strategies for generating stored values, documents and
//! fixture models.

use crate::fixtures::{Address, Post, Role, User};
use docmap_core::Reference;
use docmap_codec::{Document, EntityId, Timestamp, Value};
use proptest::prelude::*;

/// Strategy for generating entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::array::uniform16(any::<u8>()).prop_map(EntityId::from_bytes)
}

/// Strategy for generating field names, never starting with `$` or `_`.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,11}").expect("Invalid regex")
}

/// Strategy for generating scalar values of every kind.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(Value::Int64),
        (-1.0e9f64..1.0e9).prop_map(Value::Double),
        "[ -~]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        any::<i64>().prop_map(|ms| Value::Date(Timestamp::from_millis(ms))),
        entity_id_strategy().prop_map(Value::Id),
    ]
}

/// Strategy for generating nested values up to three levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec((field_name_strategy(), inner), 0..4)
                .prop_map(|fields| Value::Document(fields.into_iter().collect())),
        ]
    })
}

/// Strategy for generating documents with distinct top-level keys.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..6)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for generating valid `User` fixtures.
pub fn user_strategy() -> impl Strategy<Value = User> {
    (
        "[A-Za-z]{1,12}",
        0i32..120,
        prop::option::of("[a-z]{1,8}@example\\.com"),
        ("[0-9]{1,3} [A-Za-z ]{1,12}", "[A-Za-z]{1,12}"),
        prop::collection::vec("[a-z]{1,6}", 0..5),
        prop_oneof![Just(Role::Admin), Just(Role::Member)],
        any::<i64>(),
    )
        .prop_map(|(name, age, email, (street, city), tags, role, joined)| {
            let mut user = User::new(&name, age);
            user.email = email;
            user.address = Address { street, city };
            user.tags = tags;
            user.role = role;
            user.joined = Timestamp::from_millis(joined);
            user
        })
}

/// Strategy for generating `Post` fixtures with arbitrary author and tag
/// references. The referenced entities need not exist.
pub fn post_strategy() -> impl Strategy<Value = Post> {
    (
        "[ -~]{0,24}",
        entity_id_strategy(),
        prop::collection::vec(entity_id_strategy(), 0..4),
    )
        .prop_map(|(title, author, tags)| Post {
            id: EntityId::new(),
            title,
            author: Reference::new(author),
            tags: tags.into_iter().map(Reference::new).collect(),
            owned_tags: Vec::new(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_codec::document_to_canonical_cbor;

    proptest! {
        #[test]
        fn field_names_are_plain(name in field_name_strategy()) {
            prop_assert!(!name.starts_with('$'));
            prop_assert!(!name.contains('.'));
        }

        #[test]
        fn canonical_encoding_ignores_key_order(doc in document_strategy()) {
            let mut entries: Vec<(String, Value)> = doc
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect();
            entries.reverse();
            let reversed: Document = entries.into_iter().collect();
            if doc.len() > 1 {
                prop_assert_ne!(&doc, &reversed);
            }
            prop_assert_eq!(document_to_canonical_cbor(&doc), document_to_canonical_cbor(&reversed));
        }
    }
}

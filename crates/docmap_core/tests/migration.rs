//! Migrations and the ledger.

use docmap_codec::{doc, Document, EntityId, Value, ID_KEY};
use docmap_core::migration::MigrationPlan;
use docmap_core::{Config, CoreError, Handle, Migration, MigrationOutcome};
use docmap_store::DocumentStore;
use docmap_testkit::prelude::*;
use std::cell::Cell;

fn bump_age(doc: &mut Document) -> docmap_core::CoreResult<()> {
    let age = doc.get("age").and_then(Value::as_i32).unwrap_or_default();
    doc.insert("age", age + 1);
    Ok(())
}

#[test]
fn migration_runs_once() {
    init_tracing();
    let (db, store) = test_database();
    let users = db.collection::<User>().unwrap();
    let alice = saved(&db, User::new("Alice", 30));
    saved(&db, User::new("Bob", 40));

    let runs = Cell::new(0);
    let migrate = || {
        db.migrate::<User>("bump ages", |plan| {
            plan.map(|doc| {
                runs.set(runs.get() + 1);
                bump_age(doc)
            });
        })
    };

    assert!(migrate().unwrap().ran());
    assert_eq!(migrate().unwrap(), MigrationOutcome::AlreadyApplied);
    assert_eq!(runs.get(), 2);

    let ledger = store.documents("docmap_migrations");
    assert_eq!(ledger.len(), 1);
    assert_eq!(
        ledger[0].get(ID_KEY).and_then(Value::as_text),
        Some("users - bump ages")
    );
    let started = ledger[0].get("started").and_then(Value::as_date).unwrap();
    let completed = ledger[0].get("completed").and_then(Value::as_date).unwrap();
    assert!(started <= completed);

    assert!(db.pool().is_ghost("users", alice.id()));
    let reloaded = users.get(alice.id()).unwrap().unwrap();
    assert!(!Handle::ptr_eq(&reloaded, &alice));
    assert_eq!(reloaded.read().age, 31);
    assert_eq!(db.stats().migrations_run(), 1);
}

#[test]
fn empty_collection_is_recorded_as_skipped() {
    let (db, store) = test_database();
    let ran = Cell::new(false);

    let outcome = db
        .migrate::<Tag>("uppercase labels", |plan| {
            plan.map(|_| {
                ran.set(true);
                Ok(())
            });
        })
        .unwrap();
    assert_eq!(outcome, MigrationOutcome::Skipped);
    assert!(!ran.get());

    let ledger = store.documents("docmap_migrations");
    assert_eq!(ledger[0].get("skipped"), Some(&Value::Bool(true)));

    saved(&db, Tag::new("late"));
    let again = db
        .migrate::<Tag>("uppercase labels", |plan| {
            plan.map(|_| {
                ran.set(true);
                Ok(())
            });
        })
        .unwrap();
    assert_eq!(again, MigrationOutcome::AlreadyApplied);
    assert!(!ran.get());
    assert_eq!(db.stats().migrations_skipped(), 1);
}

#[test]
fn consecutive_maps_share_one_pass() {
    let (db, store) = test_database_with(Config::new().migration_batch_size(2));
    for n in 0..3 {
        store
            .insert(
                "legacy",
                doc! { ID_KEY => EntityId::new(), "n" => n, "fullName" => "x", "junk" => true },
            )
            .unwrap();
    }
    store.reset_operation_counts();

    let mut steps = 0;
    let outcome = db
        .migrate_collection("legacy", "reshape", |plan| {
            plan.map(|doc| {
                doc.insert("a", 1);
                Ok(())
            })
            .map(|doc| {
                doc.insert("b", 2);
                Ok(())
            })
            .map(|doc| {
                doc.remove("junk");
                Ok(())
            })
            .rename("fullName", "name");
            steps = plan.len();
        })
        .unwrap();

    assert_eq!(steps, 2);
    assert!(matches!(outcome, MigrationOutcome::Completed { steps: 2, .. }));

    let counts = store.operation_counts();
    assert_eq!(counts.finds, 2);
    assert_eq!(counts.updates, 1);
    assert_eq!(counts.bulk_updates, 2);
    assert_eq!(counts.inserts, 1);

    for doc in store.documents("legacy") {
        assert_eq!(doc.get("a"), Some(&Value::Int32(1)));
        assert_eq!(doc.get("b"), Some(&Value::Int32(2)));
        assert_eq!(doc.get("name").and_then(Value::as_text), Some("x"));
        assert!(!doc.contains_key("junk"));
        assert!(!doc.contains_key("fullName"));
    }
}

#[test]
fn transforms_read_the_collection_in_pages() {
    let (db, store) = test_database_with(Config::new().migration_batch_size(2));
    for n in 0..5 {
        store
            .insert("legacy", doc! { ID_KEY => EntityId::new(), "n" => n })
            .unwrap();
    }
    store.reset_operation_counts();

    db.migrate_collection("legacy", "double", |plan| {
        plan.map(|doc| {
            let n = doc.get("n").and_then(Value::as_i32).unwrap_or_default();
            doc.insert("n", n * 2);
            Ok(())
        });
    })
    .unwrap();

    let counts = store.operation_counts();
    assert_eq!(counts.finds, 3);
    assert_eq!(counts.bulk_updates, 3);

    let mut values: Vec<i32> = store
        .documents("legacy")
        .iter()
        .filter_map(|doc| doc.get("n").and_then(Value::as_i32))
        .collect();
    values.sort_unstable();
    assert_eq!(values, [0, 2, 4, 6, 8]);
}

#[test]
fn rename_and_remove_touch_only_documents_with_the_field() {
    let (db, store) = test_database();
    store
        .insert("legacy", doc! { ID_KEY => EntityId::new(), "old" => 1, "gone" => 2 })
        .unwrap();
    store
        .insert("legacy", doc! { ID_KEY => EntityId::new(), "new" => 5 })
        .unwrap();

    db.migrate_collection("legacy", "tidy", |plan| {
        plan.rename("old", "new").remove("gone");
    })
    .unwrap();

    let mut values: Vec<i32> = store
        .documents("legacy")
        .iter()
        .map(|doc| {
            assert!(!doc.contains_key("gone"));
            doc.get("new").and_then(Value::as_i32).unwrap()
        })
        .collect();
    values.sort_unstable();
    assert_eq!(values, [1, 5]);
}

#[test]
fn failed_migration_leaves_no_record() {
    let (db, store) = test_database();
    saved(&db, User::new("Alice", 30));

    let err = db
        .migrate::<User>("explode", |plan| {
            plan.map(|_| Err(CoreError::migration_failed("boom")));
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::MigrationFailed { .. }));
    assert!(store.is_empty("docmap_migrations"));

    let retried = db
        .migrate::<User>("explode", |plan| {
            plan.map(bump_age);
        })
        .unwrap();
    assert!(retried.ran());
}

struct DropLegacyField;

impl Migration for DropLegacyField {
    fn collection(&self) -> &str {
        "users"
    }

    fn description(&self) -> &str {
        "drop legacy field"
    }

    fn plan<'a>(&'a self, plan: &mut MigrationPlan<'a>) {
        plan.remove("legacy");
    }
}

struct BumpTagLabels;

impl Migration for BumpTagLabels {
    fn collection(&self) -> &str {
        "tags"
    }

    fn description(&self) -> &str {
        "suffix labels"
    }

    fn plan<'a>(&'a self, plan: &mut MigrationPlan<'a>) {
        plan.map(|doc| {
            let label = doc.get("label").and_then(Value::as_text).unwrap_or_default();
            let suffixed = format!("{label}!");
            doc.insert("label", suffixed);
            Ok(())
        });
    }
}

#[test]
fn registered_migrations_run_in_order() {
    let (db, store) = test_database();
    let alice = saved(&db, User::new("Alice", 30));
    store
        .update(
            "users",
            &docmap_store::UpdateSpec::new(
                docmap_store::id_filter(alice.id()),
                doc! { "$set" => doc! { "legacy" => 1 } },
                false,
                false,
            ),
        )
        .unwrap();

    let mut migrator = db.migrator();
    migrator.register(Box::new(DropLegacyField)).unwrap();
    migrator.register(Box::new(BumpTagLabels)).unwrap();
    assert!(migrator.register(Box::new(DropLegacyField)).is_err());
    assert_eq!(migrator.len(), 2);

    let result = migrator.run_pending().unwrap();
    assert_eq!(result.outcomes.len(), 2);
    assert_eq!(result.outcomes[0].0, "users - drop legacy field");
    assert_eq!(result.applied_count(), 1);
    assert_eq!(result.skipped_count(), 1);
    assert!(!store.documents("users")[0].contains_key("legacy"));

    let rerun = migrator.run_pending().unwrap();
    assert!(rerun
        .outcomes
        .iter()
        .all(|(_, outcome)| *outcome == MigrationOutcome::AlreadyApplied));
}

//! Identity pool behaviour observed through collections.

use docmap_core::{FindOptions, Handle, LifecycleState, Model, Query};
use docmap_testkit::prelude::*;
use proptest::prelude::*;

#[test]
fn saved_instance_is_returned_by_lookups() {
    init_tracing();
    let (db, _) = test_database();
    let users = db.collection::<User>().unwrap();
    let alice = saved(&db, User::new("Alice", 30));

    let by_id = users.get(alice.id()).unwrap().unwrap();
    let by_name = users
        .find_one(&User::fields().name.eq(&"Alice".to_string()))
        .unwrap()
        .unwrap();

    assert!(Handle::ptr_eq(&alice, &by_id));
    assert!(Handle::ptr_eq(&alice, &by_name));
    assert_eq!(alice.state(), LifecycleState::Pooled);
}

#[test]
fn in_memory_changes_win_over_stored_content() {
    let (db, _) = test_database();
    let users = db.collection::<User>().unwrap();
    let alice = saved(&db, User::new("Alice", 30));

    alice.write().age = 99;
    let found = users.find(&Query::all()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].read().age, 99);
}

#[test]
fn concurrent_loads_share_one_instance() {
    let (db, _) = test_database();
    let users = db.collection::<User>().unwrap();
    let id = saved(&db, User::new("Alice", 30)).id();
    db.pool().clear();

    let handles: Vec<Handle<User>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let users = users.clone();
                scope.spawn(move || users.find_with(&Query::all(), FindOptions::default()).unwrap())
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    assert_eq!(handles.len(), 8);
    for handle in &handles {
        assert_eq!(handle.id(), id);
        assert!(Handle::ptr_eq(handle, &handles[0]));
    }
    assert_eq!(db.stats().pool_misses(), 1);
}

#[test]
fn identifier_lookup_is_answered_by_the_pool() {
    let (db, store) = test_database();
    let users = db.collection::<User>().unwrap();
    let alice = saved(&db, User::new("Alice", 30));
    store.reset_operation_counts();

    let found = users.get(alice.id()).unwrap().unwrap();
    assert!(Handle::ptr_eq(&alice, &found));
    assert_eq!(store.operation_counts().finds, 0);

    let id_query = User::fields().id.eq(&alice.id());
    let bypassed = users
        .find_one_with(&id_query, FindOptions::bypass_pool())
        .unwrap()
        .unwrap();
    assert!(Handle::ptr_eq(&alice, &bypassed));
    assert_eq!(store.operation_counts().finds, 1);
}

#[test]
fn pool_lookups_can_be_disabled() {
    let (db, store) = test_database_with(docmap_core::Config::new().pool_lookups(false));
    let users = db.collection::<User>().unwrap();
    let alice = saved(&db, User::new("Alice", 30));
    store.reset_operation_counts();

    users.get(alice.id()).unwrap().unwrap();
    assert_eq!(store.operation_counts().finds, 1);
}

#[test]
fn sorted_identifier_queries_go_to_the_store() {
    let (db, store) = test_database();
    let users = db.collection::<User>().unwrap();
    let alice = saved(&db, User::new("Alice", 30));
    store.reset_operation_counts();

    let query = User::fields()
        .id
        .eq(&alice.id())
        .sort_by(User::fields().age.ascending());
    users.find(&query).unwrap();
    assert_eq!(store.operation_counts().finds, 1);
}

#[test]
fn unknown_identifier_falls_through_to_the_store() {
    let (db, store) = test_database();
    let users = db.collection::<User>().unwrap();
    store.reset_operation_counts();

    assert!(users.get(docmap_codec::EntityId::new()).unwrap().is_none());
    assert_eq!(store.operation_counts().finds, 1);
}

#[test]
fn references_resolve_through_the_pool() {
    let (db, _) = test_database();
    let alice = saved(&db, User::new("Alice", 30));
    let post = saved(&db, Post::new("Hello", &alice));

    let author = post.read().author.resolve(&db).unwrap().unwrap();
    assert!(Handle::ptr_eq(&alice, &author));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn users_survive_a_store_round_trip(user in user_strategy()) {
        let (db, _) = test_database();
        let users = db.collection::<User>().unwrap();
        let original = saved(&db, user);
        db.pool().clear();

        let loaded = users.get(original.id()).unwrap().unwrap();
        prop_assert!(!Handle::ptr_eq(&original, &loaded));
        prop_assert_eq!(&*loaded.read(), &*original.read());
    }

    #[test]
    fn posts_keep_their_references_across_a_round_trip(post in post_strategy()) {
        let (db, _) = test_database();
        let posts = db.collection::<Post>().unwrap();
        let original = saved(&db, post);
        db.pool().clear();

        let loaded = posts.get(original.id()).unwrap().unwrap();
        let (loaded, original) = (loaded.read(), original.read());
        prop_assert_eq!(&loaded.title, &original.title);
        prop_assert_eq!(loaded.author, original.author);
        prop_assert_eq!(&loaded.tags, &original.tags);

        let reencoded = loaded.encode();
        prop_assert_eq!(reencoded, original.encode());
    }
}

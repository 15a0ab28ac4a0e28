mod support;

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;

use strata_core::FileId;
use strata_engine::{IndexError, RebuildStatus, SearchScope};

use support::{env, start, EXTENSIONS, WORDS};

#[test]
fn files_containing_all_keys_is_the_intersection() {
    let env = env();
    let stack = start(&env, 1);
    let f1 = env.vfs.create_file("/src/one.txt", "a b");
    let f2 = env.vfs.create_file("/src/two.txt", "a");
    let f3 = env.vfs.create_file("/src/three.txt", "b a");

    let keys = vec!["a".to_string(), "b".to_string()];
    let mut joined = HashSet::new();
    stack
        .service
        .process_files_containing_all_keys(&WORDS, &keys, &SearchScope::Everything, None, |f| {
            joined.insert(f);
            true
        })
        .unwrap();

    let a_files = stack
        .service
        .get_containing_files(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();
    let b_files = stack
        .service
        .get_containing_files(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    let expected: HashSet<FileId> = a_files.intersection(&b_files).copied().collect();

    assert_eq!(joined, expected);
    assert_eq!(joined, [f1, f3].into_iter().collect());
    assert!(!joined.contains(&f2));
}

#[test]
fn value_filter_narrows_the_intersection() {
    let env = env();
    let stack = start(&env, 1);
    env.vfs.create_file("/src/one.txt", "a");
    let f2 = env.vfs.create_file("/src/two.txt", "a a");

    let keys = vec!["a".to_string()];
    let mut found = HashSet::new();
    stack
        .service
        .process_files_containing_all_keys(
            &WORDS,
            &keys,
            &SearchScope::Everything,
            Some(&|count: &u32| *count >= 2),
            |f| {
                found.insert(f);
                true
            },
        )
        .unwrap();
    assert_eq!(found, [f2].into_iter().collect());
}

#[test]
fn get_files_with_key_matches_containing_files() {
    let env = env();
    let stack = start(&env, 1);
    let f1 = env.vfs.create_file("/src/one.txt", "x y");
    env.vfs.create_file("/src/two.txt", "y");

    let mut found = HashSet::new();
    stack
        .service
        .get_files_with_key(
            &WORDS,
            &["x".to_string(), "y".to_string()],
            &SearchScope::Everything,
            |f| {
                found.insert(f);
                true
            },
        )
        .unwrap();
    assert_eq!(found, [f1].into_iter().collect());
}

#[test]
fn scope_restricts_results() {
    let env = env();
    let stack = start(&env, 1);
    let f1 = env.vfs.create_file("/src/one.txt", "a");
    let f2 = env.vfs.create_file("/src/two.txt", "a");

    let scope = SearchScope::single_file(f1);
    let files = stack
        .service
        .get_containing_files(&WORDS, &"a".to_string(), &scope)
        .unwrap();
    assert_eq!(files, [f1].into_iter().collect());

    let everything = stack
        .service
        .get_containing_files(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(everything, [f1, f2].into_iter().collect());
}

#[test]
fn process_values_with_restricted_file() {
    let env = env();
    let stack = start(&env, 1);
    let f1 = env.vfs.create_file("/src/one.txt", "a a");
    let f2 = env.vfs.create_file("/src/two.txt", "a");

    let mut seen = Vec::new();
    stack
        .service
        .process_values(
            &WORDS,
            &"a".to_string(),
            Some(f1),
            &SearchScope::Everything,
            |file, value| {
                seen.push((file, *value));
                true
            },
        )
        .unwrap();
    assert_eq!(seen, vec![(f1, 2)]);

    let mut seen = Vec::new();
    stack
        .service
        .process_values(
            &WORDS,
            &"a".to_string(),
            Some(f2),
            &SearchScope::Everything,
            |file, value| {
                seen.push((file, *value));
                true
            },
        )
        .unwrap();
    assert_eq!(seen, vec![(f2, 1)]);
}

#[test]
fn get_all_keys_reflects_live_state() {
    let env = env();
    let stack = start(&env, 1);
    let file = env.vfs.create_file("/src/one.txt", "a b");

    let keys = stack.service.get_all_keys(&WORDS, None).unwrap();
    assert_eq!(keys, ["a", "b"].iter().map(|s| s.to_string()).collect());

    env.vfs.delete(file);
    let keys = stack.service.get_all_keys(&WORDS, None).unwrap();
    assert_eq!(keys, HashSet::new());
}

#[test]
fn dumb_mode_fails_content_queries_but_not_content_less_ones() {
    let env = env();
    let stack = start(&env, 1);
    let file = env.vfs.create_file("/src/one.rs", "a");
    stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();

    stack.host.dumb.store(true, Ordering::SeqCst);

    let err = stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap_err();
    assert!(matches!(err, IndexError::NotReady));

    // Content-less indices are kept current by the event listener and never
    // wait for smart mode.
    let files = stack
        .service
        .get_containing_files(&EXTENSIONS, &"rs".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(files, [file].into_iter().collect());

    stack.host.dumb.store(false, Ordering::SeqCst);
    assert!(stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .is_ok());
}

#[test]
fn rebuild_request_wipes_disk_state_and_recovers() {
    let env = env();
    let stack = start(&env, 1);
    env.vfs.create_file("/src/one.txt", "a");
    stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();
    stack.service.flush();

    let index_dir = env.root().join(WORDS.name());
    assert!(std::fs::metadata(index_dir.join("storage.log")).unwrap().len() > 0);

    stack.service.request_rebuild(WORDS.name());
    assert_eq!(
        stack.service.rebuild_status(WORDS.name()),
        Some(RebuildStatus::RequiresRebuild)
    );

    let values = stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(values, Vec::<u32>::new());
    assert_eq!(
        stack.service.rebuild_status(WORDS.name()),
        Some(RebuildStatus::Ok)
    );

    assert!(!index_dir.join("storage.map").exists());
    assert_eq!(
        std::fs::metadata(index_dir.join("storage.log")).unwrap().len(),
        0
    );
}

#[test]
fn cancellation_leaves_files_scheduled() {
    let env = env();
    let stack = start(&env, 1);
    let file = env.vfs.create_file("/src/one.txt", "a");
    assert_eq!(stack.service.get_files_to_update(None), vec![file]);

    stack.host.cancel.cancel();
    let err = stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap_err();
    assert!(matches!(err, IndexError::Cancelled(_)));
    assert_eq!(stack.service.get_files_to_update(None), vec![file]);
}

#[test]
fn queries_against_an_unknown_index_are_empty() {
    use strata_engine::IndexKey;

    let env = env();
    let stack = start(&env, 1);
    env.vfs.create_file("/src/one.txt", "a");

    const UNKNOWN: IndexKey<String, u32> = IndexKey::new("no.such.index");
    let values = stack
        .service
        .get_values(&UNKNOWN, &"a".to_string(), &SearchScope::Everything)
        .unwrap();
    assert!(values.is_empty());
}

mod support;

use std::fs;

use pretty_assertions::assert_eq;

use strata_engine::SearchScope;

use support::{env, start, WORDS};

#[test]
fn editor_buffer_is_visible_and_reverts_when_dropped() {
    let env = env();
    let stack = start(&env, 1);
    let file = env.vfs.create_file("/src/f.txt", "a b b");
    stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();

    // Open an editor over the file and change its (unsaved) text.
    let doc = env.vfs.open_document(file, "a ".repeat(42));

    let values = stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(values, vec![42]);
    let values = stack
        .service
        .get_values(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(values, Vec::<u32>::new());

    let index = stack.service.index(&WORDS).unwrap();
    assert!(index.is_buffering());

    // Drop the edits: the next query observes the on-disk state again.
    env.vfs.close_document(doc);
    stack.service.unsaved_documents_dropped();
    assert!(!index.is_buffering());

    let values = stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(values, vec![1]);
    let values = stack
        .service
        .get_values(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(values, vec![2]);
}

#[test]
fn buffering_round_trip_leaves_persistent_files_untouched() {
    let env = env();
    let stack = start(&env, 1);
    let file = env.vfs.create_file("/src/f.txt", "a b b");
    stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();
    stack.service.flush();

    let storage_log = env.root().join(WORDS.name()).join("storage.log");
    let reverse_log = env.root().join(WORDS.name()).join("input_to_keys.log");
    let storage_before = fs::read(&storage_log).unwrap();
    let reverse_before = fs::read(&reverse_log).unwrap();

    let doc = env.vfs.open_document(file, "zzz");
    stack
        .service
        .get_values(&WORDS, &"zzz".to_string(), &SearchScope::Everything)
        .unwrap();
    env.vfs.close_document(doc);
    stack.service.unsaved_documents_dropped();
    stack.service.flush();

    assert_eq!(storage_before, fs::read(&storage_log).unwrap());
    assert_eq!(reverse_before, fs::read(&reverse_log).unwrap());
}

#[test]
fn saving_the_document_persists_the_buffered_state() {
    let env = env();
    let stack = start(&env, 1);
    let file = env.vfs.create_file("/src/f.txt", "a b b");
    stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();

    let doc = env.vfs.open_document(file, "c c c");
    let values = stack
        .service
        .get_values(&WORDS, &"c".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(values, vec![3]);

    // Saving fires the regular content-change events; the persistent index
    // catches up on the next query.
    env.vfs.save_document(doc);
    let values = stack
        .service
        .get_values(&WORDS, &"c".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(values, vec![3]);
    let values = stack
        .service
        .get_values(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(values, Vec::<u32>::new());
}

#[test]
fn unchanged_buffer_is_not_reindexed_on_every_query() {
    let env = env();
    let stack = start(&env, 1);
    let file = env.vfs.create_file("/src/f.txt", "a");
    stack
        .service
        .get_values(&WORDS, &"a".to_string(), &SearchScope::Everything)
        .unwrap();

    env.vfs.open_document(file, "b");
    stack
        .service
        .get_values(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    let calls_after_first = stack.words.call_count();

    stack
        .service
        .get_values(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(stack.words.call_count(), calls_after_first);
}

#[test]
fn write_action_invalidates_unsaved_document_marks() {
    let env = env();
    let stack = start(&env, 1);
    let file = env.vfs.create_file("/src/f.txt", "a");
    env.vfs.open_document(file, "b");
    stack
        .service
        .get_values(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    let calls = stack.words.call_count();

    stack.service.write_action_started();
    stack
        .service
        .get_values(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(stack.words.call_count(), calls + 1);
}

#[test]
fn transaction_lifecycle_tracks_documents() {
    let env = env();
    let stack = start(&env, 1);
    let file = env.vfs.create_file("/src/f.txt", "a");
    let doc = env.vfs.open_document(file, "b");
    stack
        .service
        .get_values(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    let calls = stack.words.call_count();

    // Starting a transaction invalidates up-to-date marks.
    stack.service.transaction_started(doc, file);
    stack
        .service
        .get_values(&WORDS, &"b".to_string(), &SearchScope::Everything)
        .unwrap();
    assert_eq!(stack.words.call_count(), calls + 1);
    stack.service.transaction_completed(doc);
}

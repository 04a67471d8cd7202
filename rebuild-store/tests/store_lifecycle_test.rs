//! Store lifecycle across a realistic sequence of operations: write
//! content-addressed objects and whole directory trees, leave scratch
//! state behind in `tmp/`, then clean selectively — the same kind of
//! whole-pipeline check as `convenient-graph`'s `cache_integrity_test.rs`,
//! but against a real directory tree instead of an in-memory simulation.

use rebuild_store::Store;

#[test]
fn put_object_is_idempotent_and_content_addressed() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("store")).unwrap();

    let key_a = store.put_object(b"hello").unwrap();
    let key_b = store.put_object(b"hello").unwrap();
    let key_c = store.put_object(b"world").unwrap();

    assert_eq!(key_a, key_b, "identical content must hash identically");
    assert_ne!(key_a, key_c);
    assert!(store.object_exists(key_a));
    assert!(store.object_exists(key_c));
}

#[test]
fn put_object_tree_round_trips_through_object_path() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("store")).unwrap();

    let src = dir.path().join("src");
    std::fs::create_dir_all(src.join("nested")).unwrap();
    std::fs::write(src.join("a.txt"), b"a").unwrap();
    std::fs::write(src.join("nested/b.txt"), b"b").unwrap();

    let hash = store.put_object_tree(&src).unwrap();
    assert!(store.object_exists(hash));

    let stored = store.object_path(hash).unwrap();
    assert!(stored.is_dir());
    assert_eq!(std::fs::read_to_string(stored.join("a.txt")).unwrap(), "a");
    assert_eq!(std::fs::read_to_string(stored.join("nested/b.txt")).unwrap(), "b");
}

#[test]
fn clean_tmp_removes_scratch_dirs_but_not_objects() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("store")).unwrap();

    let key = store.put_object(b"kept").unwrap();
    let scratch = store.tmp_dir("some_target").unwrap();
    std::fs::write(scratch.join("in_progress"), b"wip").unwrap();
    assert!(scratch.exists());

    store.clean_tmp().unwrap();

    assert!(!scratch.exists());
    assert!(store.object_exists(key), "clean_tmp must not touch objects/");
}

#[test]
fn clean_all_removes_every_shard() {
    let dir = tempfile::tempdir().unwrap();
    let store_root = dir.path().join("store");
    let store = Store::open(store_root.clone()).unwrap();

    let _ = store.put_object(b"data").unwrap();
    let _ = store.tmp_dir("t").unwrap();

    store.clean_all().unwrap();

    assert!(!store_root.join("objects").read_dir().unwrap().next().is_some());
    assert!(!store_root.join("tmp").read_dir().unwrap().next().is_some());
    assert!(!store_root.join("traces").read_dir().unwrap().next().is_some());
}

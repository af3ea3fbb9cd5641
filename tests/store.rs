use std::fs;

use camino::Utf8PathBuf;
use chrono::NaiveDate;

use ncbi16s_sync::domain::ARCHIVE_NAME;
use ncbi16s_sync::store::SnapshotStore;

fn temp_store() -> (tempfile::TempDir, SnapshotStore) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("16S")).unwrap();
    (dir, SnapshotStore::new(root))
}

fn snapshot_with_archive(store: &SnapshotStore, name: &str) {
    let dir = store.root().join(name);
    fs::create_dir_all(dir.as_std_path()).unwrap();
    fs::write(dir.join(ARCHIVE_NAME).as_std_path(), b"archive").unwrap();
}

#[test]
fn find_newest_picks_highest_tag_and_skips_junk() {
    let (_tmp, store) = temp_store();
    for name in ["2023-01-01", "2023-01-01:1", "not-a-date", "2022-12-31"] {
        snapshot_with_archive(&store, name);
    }
    let newest = store.find_newest(ARCHIVE_NAME).unwrap().unwrap();
    assert_eq!(newest.tag().to_string(), "2023-01-01:1");
    assert_eq!(newest.dir(), store.root().join("2023-01-01:1"));
}

#[test]
fn find_newest_ignores_snapshots_without_archive() {
    let (_tmp, store) = temp_store();
    snapshot_with_archive(&store, "2023-01-01");
    fs::create_dir_all(store.root().join("2024-06-01").as_std_path()).unwrap();
    let newest = store.find_newest(ARCHIVE_NAME).unwrap().unwrap();
    assert_eq!(newest.tag().to_string(), "2023-01-01");
}

#[test]
fn find_newest_keeps_non_canonical_directory_name() {
    let (_tmp, store) = temp_store();
    snapshot_with_archive(&store, "2024-05-06:01");
    let newest = store.find_newest(ARCHIVE_NAME).unwrap().unwrap();
    assert_eq!(newest.tag().to_string(), "2024-05-06:1");
    assert_eq!(newest.dir(), store.root().join("2024-05-06:01"));
    assert!(newest.archive_path().as_std_path().is_file());
}

#[test]
fn find_newest_prefers_spelling_that_holds_the_archive() {
    let (_tmp, store) = temp_store();
    fs::create_dir_all(store.root().join("2024-05-06").as_std_path()).unwrap();
    snapshot_with_archive(&store, "2024-05-06:0");
    let newest = store.find_newest(ARCHIVE_NAME).unwrap().unwrap();
    assert_eq!(newest.dir(), store.root().join("2024-05-06:0"));
    assert!(newest.archive_path().as_std_path().is_file());
}

#[test]
fn find_newest_on_missing_root_creates_it() {
    let (_tmp, store) = temp_store();
    assert!(store.find_newest(ARCHIVE_NAME).unwrap().is_none());
    assert!(store.root().as_std_path().is_dir());
}

#[test]
fn allocate_new_twice_on_one_day_gives_distinct_directories() {
    let (_tmp, store) = temp_store();
    let today = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
    let first = store.allocate_new(today).unwrap();
    let second = store.allocate_new(today).unwrap();
    assert_eq!(first.tag().to_string(), "2024-05-17");
    assert_eq!(second.tag().to_string(), "2024-05-17:1");
    assert!(first.dir().as_std_path().is_dir());
    assert!(second.dir().as_std_path().is_dir());
    assert!(second.tag() > first.tag());
}

#[test]
fn list_reports_snapshot_contents() {
    let (_tmp, store) = temp_store();
    snapshot_with_archive(&store, "2023-01-01");
    fs::create_dir_all(store.root().join("scratch").as_std_path()).unwrap();

    let entries = store.list().unwrap();
    assert_eq!(entries.len(), 2);
    let snapshot = entries.iter().find(|e| e.name == "2023-01-01").unwrap();
    assert!(snapshot.tag.is_some());
    assert!(snapshot.has_archive);
    assert!(!snapshot.has_fasta);
    assert_eq!(snapshot.entries, 1);
    let scratch = entries.iter().find(|e| e.name == "scratch").unwrap();
    assert!(scratch.tag.is_none());
}

#[test]
fn remove_snapshot_deletes_directory() {
    let (_tmp, store) = temp_store();
    let snapshot = store
        .allocate_new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        .unwrap();
    store.remove_snapshot(&snapshot).unwrap();
    assert!(!snapshot.dir().as_std_path().exists());
    store.remove_snapshot(&snapshot).unwrap();
}

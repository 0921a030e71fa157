use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use tagsync::config::SENTINEL_FILE;
use tagsync::sentinel::mark_destination;
use tagsync::{
    AttributeStore, Config, LoadStatus, Manifest, MemoryStore, RebuildStatus, Reconciler, Tag,
    TagSyncError,
};
use tempfile::TempDir;

fn config_for(root: &Path) -> Config {
    Config {
        manifest_path: root.join("home/manifest.json"),
        ..Config::default()
    }
}

fn canonical_root(temp: &TempDir) -> PathBuf {
    temp.path().canonicalize().unwrap()
}

#[test]
fn test_tag_scan_delete_update_move_rebuild() {
    let temp = TempDir::new().unwrap();
    let root = canonical_root(&temp);
    let config = config_for(&root);
    let store = MemoryStore::new();

    // Tag f with ["x", "y"]
    let src = root.join("src");
    fs::create_dir_all(&src).unwrap();
    let f = src.join("f");
    fs::write(&f, "payload").unwrap();
    set_file_mtime(&f, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let tag = Tag::generate(vec!["x".to_string(), "y".to_string()]).unwrap();
    let encoded = tag.encode().unwrap();
    assert_eq!(encoded, format!("ts/{}/x;y", tag.id));
    store.set(&f, &encoded).unwrap();

    // Scan -> entry with date_added, persisted
    let reconciler = Reconciler::new(&store, &config);
    let mut manifest = Manifest::new();
    let merged = reconciler.scan_into(&mut manifest, &src, Vec::new()).unwrap();
    assert_eq!(merged.added, 1);
    manifest.save(&config.manifest_path).unwrap();

    let (mut manifest, status) = Manifest::load(&config.manifest_path);
    assert_eq!(status, LoadStatus::Loaded);
    let entry = manifest.get(&f).unwrap();
    assert_eq!(entry.mtime, 1_600_000_000);
    assert_eq!(entry.size, 7);
    assert!(entry.date_added.is_some());

    // Move it away: update marks the entry missing
    let elsewhere = root.join("elsewhere");
    fs::create_dir_all(&elsewhere).unwrap();
    let g = elsewhere.join("g");
    fs::rename(&f, &g).unwrap();
    store.rename(&f, &g);

    let update = reconciler.update(&mut manifest);
    assert_eq!(update.newly_missing, vec![f.clone()]);
    let missing_since = manifest.get(&f).unwrap().date_missing;
    assert!(missing_since.is_some());

    // A second update leaves date_missing as it was
    let again = reconciler.update(&mut manifest);
    assert!(again.newly_missing.is_empty());
    assert_eq!(again.still_missing, 1);
    assert_eq!(manifest.get(&f).unwrap().date_missing, missing_since);

    // Rebuild over the new location re-keys the entry
    let report = reconciler
        .rebuild(&mut manifest, &[elsewhere.clone()])
        .unwrap();
    assert_eq!(report.restored(), 1);
    assert_eq!(report.outcomes[0].uuid, Some(tag.id));
    assert_eq!(
        report.outcomes[0].status,
        RebuildStatus::Restored { path: g.clone() }
    );

    assert!(!manifest.contains(&f));
    let moved = manifest.get(&g).unwrap();
    assert!(!moved.is_missing());
    assert_eq!(moved.tag, encoded);
    assert_eq!(moved.date_added, entry_date_added(&config, &f));
}

fn entry_date_added(config: &Config, path: &Path) -> Option<chrono::DateTime<chrono::Utc>> {
    let (saved, _) = Manifest::load(&config.manifest_path);
    saved.get(path).and_then(|e| e.date_added)
}

#[test]
fn test_update_refreshes_changed_mtime() {
    let temp = TempDir::new().unwrap();
    let root = canonical_root(&temp);
    let config = config_for(&root);
    let store = MemoryStore::new();

    let f = root.join("data.bin");
    fs::write(&f, "abc").unwrap();
    store.set(&f, &Tag::generate(Vec::new()).unwrap().encode().unwrap()).unwrap();

    let reconciler = Reconciler::new(&store, &config);
    let mut manifest = Manifest::new();
    reconciler.scan_into(&mut manifest, &root, Vec::new()).unwrap();

    set_file_mtime(&f, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();
    let report = reconciler.update(&mut manifest);
    assert_eq!(report.refreshed, 1);
    assert_eq!(manifest.get(&f).unwrap().mtime, 1_500_000_000);
}

#[test]
fn test_destination_guard_leaves_manifest_unmodified() {
    let temp = TempDir::new().unwrap();
    let root = canonical_root(&temp);
    let config = config_for(&root);
    let store = MemoryStore::new();

    let tree = root.join("tree");
    let dest = tree.join("backup");
    fs::create_dir_all(&dest).unwrap();
    let f = tree.join("a");
    fs::write(&f, "a").unwrap();
    store.set(&f, &Tag::generate(Vec::new()).unwrap().encode().unwrap()).unwrap();
    mark_destination(&dest, SENTINEL_FILE).unwrap();

    let mut manifest = Manifest::new();
    manifest.save(&config.manifest_path).unwrap();
    let before = fs::read(&config.manifest_path).unwrap();

    let reconciler = Reconciler::new(&store, &config);
    let err = reconciler
        .scan_into(&mut manifest, &tree, Vec::new())
        .unwrap_err();
    assert!(matches!(err, TagSyncError::DestinationGuard { ref path } if path == &dest));
    assert!(manifest.is_empty());
    assert_eq!(fs::read(&config.manifest_path).unwrap(), before);
}

#[test]
fn test_name_filter_limits_scan() {
    let temp = TempDir::new().unwrap();
    let root = canonical_root(&temp);
    let config = config_for(&root);
    let store = MemoryStore::new();

    let photos = root.join("photos.jpg");
    let notes = root.join("notes.txt");
    fs::write(&photos, "p").unwrap();
    fs::write(&notes, "n").unwrap();
    store
        .set(&photos, &Tag::generate(vec!["media".to_string()]).unwrap().encode().unwrap())
        .unwrap();
    store
        .set(&notes, &Tag::generate(vec!["docs".to_string()]).unwrap().encode().unwrap())
        .unwrap();

    let mut manifest = Manifest::new();
    Reconciler::new(&store, &config)
        .scan_into(&mut manifest, &root, vec!["docs".to_string()])
        .unwrap();
    assert_eq!(manifest.paths(), vec![notes]);
}

#[test]
fn test_rescan_through_other_spellings_keeps_one_key() {
    let temp = TempDir::new().unwrap();
    let root = canonical_root(&temp);
    let config = config_for(&root);
    let store = MemoryStore::new();

    let src = root.join("src");
    fs::create_dir_all(src.join("inner")).unwrap();
    let f = src.join("f");
    fs::write(&f, "f").unwrap();
    store.set(&f, &Tag::generate(Vec::new()).unwrap().encode().unwrap()).unwrap();

    let reconciler = Reconciler::new(&store, &config);
    let mut manifest = Manifest::new();
    reconciler.scan_into(&mut manifest, &src, Vec::new()).unwrap();
    let again = reconciler
        .scan_into(&mut manifest, &src.join("../src"), Vec::new())
        .unwrap();
    reconciler
        .scan_into(&mut manifest, &src.join("inner/.."), Vec::new())
        .unwrap();

    assert_eq!(again.added, 0);
    assert_eq!(again.updated, 1);
    assert_eq!(manifest.paths(), vec![f]);
}

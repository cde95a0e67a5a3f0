//! File content cache against a real directory tree.

use docket_cache::file_cache::io::read_json;
use docket_cache::{gz_sibling, stage_write, FileContentCache};
use docket_core::{DocketError, FileCacheConfig, FileCacheError};
use docket_test_utils::{init_tracing, sample_document, set_accessed_ago, shared, write_json, ManualClock};
use serde_json::json;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const DAY: Duration = Duration::from_secs(86_400);

fn file_cache() -> FileContentCache {
    FileContentCache::new(FileCacheConfig::default(), shared(&ManualClock::fixed()))
}

#[test]
fn interrupted_write_leaves_original_bytes() {
    let dir = TempDir::new().unwrap();
    let path = write_json(dir.path(), "clients/c1.json", &json!({"name": "Original"}));
    let original = fs::read(&path).unwrap();

    let bytes = serde_json::to_vec(&json!({"name": "Replacement"})).unwrap();
    let staged = stage_write(&path, &bytes).unwrap();
    let temp = staged.temp_path().to_path_buf();
    // Simulate a crash between the temp write and the rename
    drop(staged);

    assert_eq!(fs::read(&path).unwrap(), original);
    assert!(!temp.exists());
    let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn committed_write_replaces_destination() {
    let dir = TempDir::new().unwrap();
    let path = write_json(dir.path(), "c1.json", &json!(1));

    let staged = stage_write(&path, b"2").unwrap();
    assert_eq!(staged.dest(), path.as_path());
    staged.commit().unwrap();
    assert_eq!(read_json(&path).unwrap(), json!(2));
}

#[test]
fn compressed_round_trip_through_cache() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("d1.json");
    let writer = file_cache();
    writer.write(&path, &sample_document("d1"), true).unwrap();
    assert!(gz_sibling(&path).exists());
    assert!(!path.exists());

    // A cold cache finds the sibling on its own
    let reader = file_cache();
    assert_eq!(reader.read(&path).unwrap(), sample_document("d1"));
}

#[test]
fn read_of_missing_file_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache();
    let path = dir.path().join("ghost.json");
    assert_eq!(
        cache.read(&path),
        Err(DocketError::FileCache(FileCacheError::NotFound { path }))
    );
    assert_eq!(cache.get_stats().misses, 1);
}

#[test]
fn optimize_directory_compresses_cold_files() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let cold = write_json(dir.path(), "documents/2024/old.json", &sample_document("old"));
    let warm = write_json(dir.path(), "documents/new.json", &sample_document("new"));
    set_accessed_ago(&cold, 2 * DAY);

    let cache = file_cache();
    let report = cache.optimize_directory(dir.path()).unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.compressed, vec![cold.clone()]);
    assert_eq!(report.errors, 0);
    assert!(!cold.exists());
    assert!(gz_sibling(&cold).exists());
    assert!(warm.exists());

    // The logical path still reads
    assert_eq!(cache.read(&cold).unwrap(), sample_document("old"));
    assert_eq!(cache.get_stats().compactions, 1);

    // Already compressed files are not rescanned
    let again = cache.optimize_directory(dir.path()).unwrap();
    assert_eq!(again.scanned, 1);
    assert!(again.compressed.is_empty());
}

#[test]
fn optimize_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache();
    let missing = dir.path().join("nope");
    assert!(matches!(
        cache.optimize_directory(&missing),
        Err(DocketError::FileCache(FileCacheError::NotFound { .. }))
    ));
}

#[test]
fn concurrent_readers_and_sweeps_agree() {
    let dir = TempDir::new().unwrap();
    let config = FileCacheConfig {
        max_entries: 4,
        ..Default::default()
    };
    let cache = std::sync::Arc::new(FileContentCache::new(config, shared(&ManualClock::fixed())));
    let paths: Vec<_> = (0..8)
        .map(|i| write_json(dir.path(), &format!("d{i}.json"), &json!(i)))
        .collect();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let cache = cache.clone();
            let paths = &paths;
            scope.spawn(move || {
                for round in 0..50 {
                    let i = (worker + round) % paths.len();
                    assert_eq!(cache.read(&paths[i]).unwrap(), json!(i));
                }
            });
        }
        let cache = cache.clone();
        scope.spawn(move || {
            for _ in 0..20 {
                cache.sweep();
            }
        });
    });

    assert!(cache.len() <= 4);
}

#[test]
fn writes_are_visible_through_either_name() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clients").join("c1.json");
    fs::create_dir(path.parent().unwrap()).unwrap();
    let packed = gz_sibling(&path);
    let dotted = dir.path().join(".").join("clients").join("c1.json");
    let cache = std::sync::Arc::new(file_cache());
    cache.write(&path, &json!({"v": 0}), true).unwrap();

    std::thread::scope(|scope| {
        let writer = cache.clone();
        let (path, dotted) = (&path, &dotted);
        scope.spawn(move || {
            for v in 1..=20 {
                let target = if v % 2 == 0 { path } else { dotted };
                writer.write(target, &json!({ "v": v }), v % 3 == 0).unwrap();
            }
        });
        for _ in 0..2 {
            let reader = cache.clone();
            let packed = &packed;
            scope.spawn(move || {
                let mut last = 0;
                for _ in 0..50 {
                    let v = reader.read(packed).unwrap()["v"].as_i64().unwrap();
                    assert!(v >= last, "read went backwards: {v} after {last}");
                    last = v;
                }
            });
        }
    });

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.read(&packed).unwrap(), json!({"v": 20}));
    assert_eq!(cache.read(&dotted).unwrap(), json!({"v": 20}));
    assert_eq!(read_json(&path).unwrap(), json!({"v": 20}));
}

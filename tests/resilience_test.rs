mod helpers;

use helpers::plain_store;
use std::sync::Arc;
use tempfile::TempDir;
use zandalee_memory::db;
use zandalee_memory::memory::types::NewMemory;
use zandalee_memory::memory::MemoryStore;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    // Should not exist yet
    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();
    assert!(db_path.exists());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn health_check_passes_on_valid_store() {
    let (_tmp, store) = plain_store();
    store.remember(&NewMemory::new("healthy")).unwrap();
    store.upsert_procedural("check", &["one".to_string()], None, &[]).unwrap();

    let report = store.health().unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    // The procedural upsert adds its own live memory
    assert_eq!(report.memory_count, 2);
    assert_eq!(report.rollup_count, 0);
    assert_eq!(report.procedural_version_count, 1);
}

#[test]
fn busy_timeout_is_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("test.db")).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn concurrent_writers_share_one_store() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::open(tmp.path(), None).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..10 {
                    store.remember(&NewMemory::new(format!("thread {t} note {i}"))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.stats().unwrap().total, 40);
    assert_eq!(store.working_log(0).len(), 40);
}

#[test]
fn corrupt_working_log_does_not_block_writes() {
    let (_tmp, store) = plain_store();
    std::fs::write(&store.paths().working_log, "{ not json").unwrap();

    store.remember(&NewMemory::new("still works")).unwrap();
    assert_eq!(store.working_log(0).len(), 1);
}

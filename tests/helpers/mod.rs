#![allow(dead_code)]

use rusqlite::{params, Connection};
use tempfile::TempDir;
use zandalee_memory::crypto::Secret;
use zandalee_memory::db;
use zandalee_memory::memory::types::{MemoryKind, NewMemory, Salience};
use zandalee_memory::memory::MemoryStore;

pub const TEST_TOKEN: &str = "integration-laws-token";

/// A store rooted in a fresh temp dir. Keep the `TempDir` alive for the test.
pub fn plain_store() -> (TempDir, MemoryStore) {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::open(tmp.path(), None).unwrap();
    (tmp, store)
}

pub fn sealed_store() -> (TempDir, MemoryStore) {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::open(tmp.path(), Secret::new(TEST_TOKEN)).unwrap();
    (tmp, store)
}

/// A fresh on-disk database with schema and migrations applied.
pub fn test_db() -> (TempDir, Connection) {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("mem.db")).unwrap();
    (tmp, conn)
}

/// A second connection to the store's database, for row-level inspection.
pub fn raw_conn(store: &MemoryStore) -> Connection {
    Connection::open(&store.paths().db).unwrap()
}

/// Salience whose score equals `value` (the weights sum to one).
pub fn flat_salience(value: f64) -> Salience {
    Salience {
        importance: value,
        relevance: value,
        emotion: value,
        effort: value,
        novelty: value,
        confidence: None,
    }
}

/// Store an episodic memory and backdate it to `created_at`.
pub fn episodic_at(store: &MemoryStore, content: &str, score: f64, created_at: &str) -> i64 {
    episodic_with(store, NewMemory::new(content).salience(flat_salience(score)), created_at)
}

/// Store `memory` as episodic and backdate it to `created_at`.
pub fn episodic_with(store: &MemoryStore, memory: NewMemory, created_at: &str) -> i64 {
    let id = store.remember(&memory.kind(MemoryKind::Episodic)).unwrap();
    raw_conn(store)
        .execute(
            "UPDATE memories SET created_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![created_at, id],
        )
        .unwrap();
    id
}

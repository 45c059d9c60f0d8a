//! SQL DDL for the memory store.
//!
//! Defines `memories`, its external-content FTS5 index `memories_fts` (kept in
//! sync by triggers), `episodic_rollups`, `procedural_versions` and `meta`.
//! All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// Core tables. `content`, `tags`, `salience` and `provenance` hold either TEXT
/// (plaintext) or a tagged BLOB (sealed), so they carry no declared type.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT
);

CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    content NOT NULL,
    tags,
    salience,
    provenance,
    pinned INTEGER DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Full-text search over plaintext rows
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    tags,
    kind,
    content='memories',
    content_rowid='id'
);

-- Monthly highlights, one row per period
CREATE TABLE IF NOT EXISTS episodic_rollups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    period TEXT NOT NULL,
    summary NOT NULL,
    source_ids TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Playbook history, append-only
CREATE TABLE IF NOT EXISTS procedural_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_tag TEXT NOT NULL,
    version INTEGER NOT NULL,
    steps NOT NULL,
    notes,
    source_ids TEXT,
    created_at TEXT NOT NULL
);
"#;

/// External-content FTS5 tables must be told the old values on update/delete.
pub(crate) const FTS_TRIGGERS_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, content, tags, kind)
    VALUES (new.id, new.content, new.tags, new.kind);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, tags, kind)
    VALUES ('delete', old.id, old.content, old.tags, old.kind);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, tags, kind)
    VALUES ('delete', old.id, old.content, old.tags, old.kind);
    INSERT INTO memories_fts(rowid, content, tags, kind)
    VALUES (new.id, new.content, new.tags, new.kind);
END;
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(FTS_TRIGGERS_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

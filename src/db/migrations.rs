//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `meta` and runs sequential migrations to bring
//! the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::Connection;

use super::schema::FTS_TRIGGERS_SQL;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

/// Update the stored schema version.
fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: lookup indexes, and replace FTS triggers that issued plain
/// UPDATE/DELETE against the external-content index with the `'delete'`
/// command form, then rebuild the index from `memories`.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind);
        CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
        CREATE INDEX IF NOT EXISTS idx_rollups_period ON episodic_rollups(period);
        CREATE INDEX IF NOT EXISTS idx_procedural_subject
            ON procedural_versions(subject_tag, version);

        DROP TRIGGER IF EXISTS memories_ai;
        DROP TRIGGER IF EXISTS memories_ad;
        DROP TRIGGER IF EXISTS memories_au;
        "#,
    )?;
    conn.execute_batch(FTS_TRIGGERS_SQL)?;
    conn.execute("INSERT INTO memories_fts(memories_fts) VALUES ('rebuild')", [])?;
    Ok(())
}

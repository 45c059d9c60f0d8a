use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Response from [`memory_stats`].
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub dir: String,
    pub db: String,
    pub total: u64,
    /// Most common kind first.
    pub by_kind: Vec<KindCount>,
    pub size_mb: f64,
    pub encrypted: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct KindCount {
    pub kind: String,
    pub count: u64,
}

/// Compute store statistics. Read-only.
///
/// `db_path` is used for file size calculation; pass None for in-memory databases.
pub fn memory_stats(
    conn: &Connection,
    root: &Path,
    db_path: Option<&Path>,
    encrypted: bool,
) -> Result<StatsResponse> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
    let by_kind = count_by_kind(conn)?;

    let size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        dir: root.display().to_string(),
        db: db_path.map(|p| p.display().to_string()).unwrap_or_default(),
        total: total as u64,
        by_kind,
        size_mb: bytes_to_mb(size_bytes),
        encrypted,
    })
}

/// Count by kind, most common first.
fn count_by_kind(conn: &Connection) -> Result<Vec<KindCount>> {
    let mut stmt = conn.prepare(
        "SELECT kind, COUNT(*) AS c FROM memories GROUP BY kind ORDER BY c DESC, kind ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(KindCount {
                kind: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Megabytes rounded to three decimals.
fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 1000.0).round() / 1000.0
}

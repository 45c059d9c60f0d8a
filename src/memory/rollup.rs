//! Monthly episodic rollups.
//!
//! A rollup is a bulleted digest of the highest-salience episodic memories
//! created in a `YYYY-MM` period. There is at most one rollup per period;
//! re-running overwrites it in place.
//!
//! The period window is `[YYYY-MM-01, YYYY-MM-32)` compared as strings against
//! the ISO 8601 `created_at` column. Day 32 never exists, but every timestamp
//! inside the month sorts below it and every timestamp in the next month sorts
//! above it, so the window is exactly "created during this month".

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::FieldCodec;
use crate::error::MemoryError;
use crate::memory::search::sort_by_salience;
use crate::memory::store::{RawMemoryRow, MEMORY_COLUMNS};
use crate::memory::types::{EpisodicRollup, Memory, RollupOutcome, ROLLUP_SALIENCE_THRESHOLD};

/// Maximum number of memories listed in one rollup.
pub const ROLLUP_MAX_ITEMS: usize = 10;

/// The current UTC period, `YYYY-MM`.
pub fn current_period() -> String {
    Utc::now().format("%Y-%m").to_string()
}

pub fn validate_period(period: &str) -> Result<()> {
    let well_formed = period.len() == 7
        && NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d").is_ok();
    if well_formed {
        Ok(())
    } else {
        Err(MemoryError::InvalidPeriod(period.to_string()).into())
    }
}

/// Build (or rebuild) the rollup for `period`.
///
/// Qualifying memories are episodic, created in the period, and either score at
/// least [`ROLLUP_SALIENCE_THRESHOLD`] or are pinned. Returns
/// `(0, None)` without touching the table when nothing qualifies.
pub fn rollup_month(conn: &mut Connection, codec: &FieldCodec, period: &str) -> Result<RollupOutcome> {
    validate_period(period)?;
    let lo = format!("{period}-01");
    let hi = format!("{period}-32");

    let tx = conn.transaction()?;

    let mut candidates: Vec<Memory> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories \
             WHERE kind = 'episodic' AND created_at >= ?1 AND created_at < ?2 \
             ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![lo, hi], RawMemoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|raw| raw.decode(codec))
            .collect::<Result<Vec<_>>>()?
    };
    candidates.retain(|m| m.pinned || m.salience.score() >= ROLLUP_SALIENCE_THRESHOLD);

    if candidates.is_empty() {
        return Ok(RollupOutcome {
            source_count: 0,
            rollup_id: None,
        });
    }

    sort_by_salience(&mut candidates);
    candidates.truncate(ROLLUP_MAX_ITEMS);

    let summary = render_summary(period, &candidates);
    let source_ids: Vec<i64> = candidates.iter().map(|m| m.id).collect();
    let source_json = serde_json::to_string(&source_ids)?;
    let sealed_summary = codec.seal(&summary)?;
    let now = super::utc_now();

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM episodic_rollups WHERE period = ?1 ORDER BY id LIMIT 1",
            params![period],
            |row| row.get(0),
        )
        .optional()?;

    let rollup_id = match existing {
        Some(id) => {
            tx.execute(
                "UPDATE episodic_rollups SET summary = ?1, source_ids = ?2, created_at = ?3 WHERE id = ?4",
                params![sealed_summary, source_json, now, id],
            )?;
            id
        }
        None => {
            tx.execute(
                "INSERT INTO episodic_rollups (period, summary, source_ids, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![period, sealed_summary, source_json, now],
            )?;
            tx.last_insert_rowid()
        }
    };
    tx.commit()?;

    Ok(RollupOutcome {
        source_count: source_ids.len(),
        rollup_id: Some(rollup_id),
    })
}

/// `Highlights for {period}:` followed by one `- content [tag, tag]` line per memory.
fn render_summary(period: &str, items: &[Memory]) -> String {
    let mut summary = format!("Highlights for {period}:");
    for memory in items {
        summary.push_str("\n- ");
        summary.push_str(&memory.content);
        if !memory.tags.is_empty() {
            summary.push_str(&format!(" [{}]", memory.tags.join(", ")));
        }
    }
    summary
}

/// Read back the rollup stored for `period`.
pub fn get_rollup(conn: &Connection, codec: &FieldCodec, period: &str) -> Result<Option<EpisodicRollup>> {
    let row = conn
        .query_row(
            "SELECT id, period, summary, source_ids, created_at FROM episodic_rollups \
             WHERE period = ?1 ORDER BY id LIMIT 1",
            params![period],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, crate::crypto::StoredField>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, period, summary, source_ids, created_at)) = row else {
        return Ok(None);
    };
    Ok(Some(EpisodicRollup {
        id,
        period,
        summary: codec.open(summary)?,
        source_ids: serde_json::from_str(&source_ids)
            .map_err(|e| MemoryError::MalformedField(e.to_string()))?,
        created_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::remember;
    use crate::memory::types::{MemoryKind, NewMemory, Salience};

    fn episodic(conn: &Connection, codec: &FieldCodec, text: &str, score: f64, created_at: &str) -> i64 {
        let id = remember(
            conn,
            codec,
            &NewMemory::new(text)
                .kind(MemoryKind::Episodic)
                .tags(["day"])
                // Weights sum to one, so every sub-score equal to `score` yields `score`.
                .salience(Salience {
                    importance: score,
                    relevance: score,
                    emotion: score,
                    effort: score,
                    novelty: score,
                    confidence: None,
                }),
        )
        .unwrap();
        conn.execute(
            "UPDATE memories SET created_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![created_at, id],
        )
        .unwrap();
        id
    }

    #[test]
    fn period_validation() {
        assert!(validate_period("2025-03").is_ok());
        assert!(validate_period("2025-13").is_err());
        assert!(validate_period("2025-3").is_err());
        assert!(validate_period("March").is_err());
    }

    #[test]
    fn window_covers_whole_month_only() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        let first = episodic(&conn, &codec, "first day", 0.9, "2025-03-01T00:00:00.000000Z");
        let last = episodic(&conn, &codec, "last day", 0.9, "2025-03-31T23:59:59.999999Z");
        episodic(&conn, &codec, "february", 0.9, "2025-02-28T23:59:59.000000Z");
        episodic(&conn, &codec, "april", 0.9, "2025-04-01T00:00:00.000000Z");

        let outcome = rollup_month(&mut conn, &codec, "2025-03").unwrap();
        assert_eq!(outcome.source_count, 2);

        let rollup = get_rollup(&conn, &codec, "2025-03").unwrap().unwrap();
        let mut ids = rollup.source_ids.clone();
        ids.sort();
        assert_eq!(ids, vec![first, last]);
    }

    #[test]
    fn nothing_qualifying_creates_no_row() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        episodic(&conn, &codec, "quiet day", 0.1, "2025-03-10T09:00:00.000000Z");

        let outcome = rollup_month(&mut conn, &codec, "2025-03").unwrap();
        assert_eq!(outcome, RollupOutcome { source_count: 0, rollup_id: None });
        assert!(get_rollup(&conn, &codec, "2025-03").unwrap().is_none());
    }

    #[test]
    fn pinned_low_salience_still_counts() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        let id = episodic(&conn, &codec, "small but pinned", 0.1, "2025-03-10T09:00:00.000000Z");
        conn.execute("UPDATE memories SET pinned = 1 WHERE id = ?1", params![id]).unwrap();

        let outcome = rollup_month(&mut conn, &codec, "2025-03").unwrap();
        assert_eq!(outcome.source_count, 1);
    }

    #[test]
    fn summary_format() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        episodic(&conn, &codec, "Moved into the new flat", 0.9, "2025-03-02T10:00:00.000000Z");
        episodic(&conn, &codec, "Booked the van", 0.7, "2025-03-01T10:00:00.000000Z");

        rollup_month(&mut conn, &codec, "2025-03").unwrap();
        let rollup = get_rollup(&conn, &codec, "2025-03").unwrap().unwrap();
        assert_eq!(
            rollup.summary,
            "Highlights for 2025-03:\n- Moved into the new flat [day]\n- Booked the van [day]"
        );
    }

    #[test]
    fn caps_at_ten_items() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        for i in 0..12 {
            episodic(&conn, &codec, &format!("event {i}"), 0.9, "2025-03-05T10:00:00.000000Z");
        }
        let outcome = rollup_month(&mut conn, &codec, "2025-03").unwrap();
        assert_eq!(outcome.source_count, ROLLUP_MAX_ITEMS);
    }
}

//! Versioned playbooks.
//!
//! Every upsert appends an immutable row to `procedural_versions` and refreshes
//! a single live `procedural` memory for the subject tag, so recall always
//! surfaces the latest steps while the full history stays queryable.

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::crypto::{FieldCodec, StoredField};
use crate::memory::store::{decode_json, insert_memory, RawMemoryRow, MEMORY_COLUMNS};
use crate::memory::types::{MemoryKind, NewMemory, ProceduralOutcome, ProceduralVersion, Salience};

/// Tag added to every live procedural memory alongside its subject tag.
pub const PROCEDURAL_TAG: &str = "procedural";

fn live_salience() -> Salience {
    Salience {
        importance: 0.8,
        relevance: 0.9,
        emotion: 0.0,
        effort: 0.0,
        novelty: 0.0,
        confidence: Some(0.9),
    }
}

/// `Procedure '{tag}' (v{n})` followed by numbered steps.
fn render_content(subject_tag: &str, version: i64, steps: &[String]) -> String {
    let mut content = format!("Procedure '{subject_tag}' (v{version})");
    for (i, step) in steps.iter().enumerate() {
        content.push_str(&format!("\n{}. {}", i + 1, step));
    }
    content
}

/// Record a new version of the playbook for `subject_tag`.
///
/// Version numbers start at 1 and increase by one per call for the same tag.
/// The history insert and the live-memory refresh commit together.
pub fn upsert_procedural(
    conn: &mut Connection,
    codec: &FieldCodec,
    subject_tag: &str,
    steps: &[String],
    notes: Option<&str>,
    source_ids: &[i64],
) -> Result<ProceduralOutcome> {
    let now = super::utc_now();
    let steps_json = serde_json::to_string(steps)?;
    let sources_json = serde_json::to_string(source_ids)?;

    let tx = conn.transaction()?;

    let latest: Option<i64> = tx.query_row(
        "SELECT MAX(version) FROM procedural_versions WHERE subject_tag = ?1",
        params![subject_tag],
        |row| row.get(0),
    )?;
    let version = latest.unwrap_or(0) + 1;

    tx.execute(
        "INSERT INTO procedural_versions (subject_tag, version, steps, notes, source_ids, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            subject_tag,
            version,
            codec.seal(&steps_json)?,
            codec.seal(notes.unwrap_or(""))?,
            sources_json,
            now,
        ],
    )?;

    let content = render_content(subject_tag, version, steps);
    let tags = vec![subject_tag.to_string(), PROCEDURAL_TAG.to_string()];
    let salience = live_salience();

    let memory_id = match find_live_memory(&tx, codec, subject_tag)? {
        Some(id) => {
            tx.execute(
                "UPDATE memories SET content = ?1, tags = ?2, salience = ?3, updated_at = ?4 WHERE id = ?5",
                params![
                    codec.seal(&content)?,
                    codec.seal(&serde_json::to_string(&tags)?)?,
                    codec.seal(&serde_json::to_string(&salience)?)?,
                    now,
                    id,
                ],
            )?;
            id
        }
        None => {
            let memory = NewMemory::new(content)
                .kind(MemoryKind::Procedural)
                .tags(tags)
                .salience(salience)
                .provenance(serde_json::json!({"kind": "system"}))
                .pinned(true);
            insert_memory(&tx, codec, &memory, &now, &now)?
        }
    };
    tx.commit()?;

    Ok(ProceduralOutcome {
        version,
        subject_tag: subject_tag.to_string(),
        memory_id,
    })
}

/// The oldest procedural memory tagged with `subject_tag`.
///
/// Tags may be sealed, so matching happens after decryption rather than in SQL.
fn find_live_memory(conn: &Connection, codec: &FieldCodec, subject_tag: &str) -> Result<Option<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE kind = 'procedural' ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([], RawMemoryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for raw in rows {
        let id = raw.id;
        let tags: Vec<String> = decode_json(codec, raw.tags, "[]")?;
        if tags.iter().any(|t| t == subject_tag) {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// Every recorded version for `subject_tag`, oldest first.
pub fn procedural_history(
    conn: &Connection,
    codec: &FieldCodec,
    subject_tag: &str,
) -> Result<Vec<ProceduralVersion>> {
    let mut stmt = conn.prepare(
        "SELECT id, subject_tag, version, steps, notes, source_ids, created_at \
         FROM procedural_versions WHERE subject_tag = ?1 ORDER BY version",
    )?;
    let rows = stmt
        .query_map(params![subject_tag], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, StoredField>(3)?,
                row.get::<_, StoredField>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, subject_tag, version, steps, notes, source_ids, created_at)| -> Result<ProceduralVersion> {
            let source_ids = match source_ids.as_deref().map(str::trim) {
                None | Some("") => Vec::new(),
                Some(text) => serde_json::from_str(text)?,
            };
            Ok(ProceduralVersion {
                id,
                subject_tag,
                version,
                steps: decode_json(codec, steps, "[]")?,
                notes: codec.open(notes)?,
                source_ids,
                created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Secret;
    use crate::db;
    use crate::memory::store::get_memory;

    fn steps(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn content_lists_numbered_steps() {
        assert_eq!(
            render_content("tea", 2, &steps(&["Boil water", "Steep 3 min"])),
            "Procedure 'tea' (v2)\n1. Boil water\n2. Steep 3 min"
        );
    }

    #[test]
    fn versions_increase_and_live_memory_is_reused() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();

        let first = upsert_procedural(&mut conn, &codec, "tea", &steps(&["Boil water"]), None, &[]).unwrap();
        let second =
            upsert_procedural(&mut conn, &codec, "tea", &steps(&["Boil water", "Steep"]), Some("milk last"), &[4])
                .unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(first.memory_id, second.memory_id);

        let live = get_memory(&conn, &codec, second.memory_id).unwrap().unwrap();
        assert_eq!(live.kind, MemoryKind::Procedural);
        assert_eq!(live.content, "Procedure 'tea' (v2)\n1. Boil water\n2. Steep");
        assert_eq!(live.tags, vec!["tea", "procedural"]);
        assert!(live.pinned);
        assert_eq!(live.provenance, serde_json::json!({"kind": "system"}));
        assert_eq!(live.salience.confidence, Some(0.9));

        let history = procedural_history(&conn, &codec, "tea").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].notes, "milk last");
        assert_eq!(history[1].source_ids, vec![4]);
        assert!(history[0].notes.is_empty());
    }

    #[test]
    fn subjects_are_independent() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();

        let tea = upsert_procedural(&mut conn, &codec, "tea", &steps(&["Boil"]), None, &[]).unwrap();
        let bins = upsert_procedural(&mut conn, &codec, "bins", &steps(&["Wheel out"]), None, &[]).unwrap();
        assert_eq!(bins.version, 1);
        assert_ne!(tea.memory_id, bins.memory_id);
    }

    #[test]
    fn encrypted_history_is_sealed_at_rest() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::new(Secret::new("proc-token").as_ref()).unwrap();

        upsert_procedural(&mut conn, &codec, "tea", &steps(&["Boil water"]), Some("secret"), &[]).unwrap();
        let kind: String = conn
            .query_row("SELECT typeof(steps) FROM procedural_versions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(kind, "blob");

        // Second upsert must find the live memory through its sealed tags.
        let again = upsert_procedural(&mut conn, &codec, "tea", &steps(&["Boil"]), None, &[]).unwrap();
        assert_eq!(again.version, 2);
        let live: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories WHERE kind = 'procedural'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(live, 1);

        let history = procedural_history(&conn, &codec, "tea").unwrap();
        assert_eq!(history[0].steps, vec!["Boil water"]);
        assert_eq!(history[0].notes, "secret");
    }
}

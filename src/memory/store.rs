//! Write path and row codec for the `memories` table.
//!
//! Every sealable column (`content`, `tags`, `salience`, `provenance`) goes
//! through [`FieldCodec`] on the way in and out, so callers only ever see
//! decrypted [`Memory`] values. `kind`, `pinned` and the timestamps stay in
//! plaintext for filtering.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::crypto::{FieldCodec, StoredField};
use crate::error::MemoryError;
use crate::memory::types::{Memory, MemoryKind, MemoryPatch, NewMemory, Salience};

/// Column list matching [`RawMemoryRow::from_row`].
pub(crate) const MEMORY_COLUMNS: &str =
    "id, kind, content, tags, salience, provenance, pinned, created_at, updated_at";

/// A `memories` row before decryption.
pub(crate) struct RawMemoryRow {
    pub id: i64,
    pub kind: String,
    pub content: StoredField,
    pub tags: StoredField,
    pub salience: StoredField,
    pub provenance: StoredField,
    pub pinned: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl RawMemoryRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            content: row.get(2)?,
            tags: row.get(3)?,
            salience: row.get(4)?,
            provenance: row.get(5)?,
            pinned: row.get::<_, Option<i64>>(6)?.unwrap_or(0) != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    pub fn decode(self, codec: &FieldCodec) -> Result<Memory> {
        let kind: MemoryKind = self
            .kind
            .parse()
            .with_context(|| format!("memory {} has an unreadable kind", self.id))?;
        let content = codec.open(self.content)?;
        let tags = decode_json(codec, self.tags, "[]")?;
        let salience = decode_json(codec, self.salience, "{}")?;
        let provenance = decode_json(codec, self.provenance, "{}")?;

        Ok(Memory {
            id: self.id,
            kind,
            content,
            tags,
            salience,
            provenance,
            pinned: self.pinned,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Open a JSON-valued column, treating an empty value as `empty`.
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    codec: &FieldCodec,
    field: StoredField,
    empty: &str,
) -> Result<T> {
    let text = codec.open(field)?;
    let text = if text.trim().is_empty() { empty } else { text.as_str() };
    serde_json::from_str(text).map_err(|e| MemoryError::MalformedField(e.to_string()).into())
}

/// The four sealable columns, ready to bind.
pub(crate) struct SealedFields {
    pub content: StoredField,
    pub tags: StoredField,
    pub salience: StoredField,
    pub provenance: StoredField,
}

impl SealedFields {
    pub fn seal(
        codec: &FieldCodec,
        content: &str,
        tags: &[String],
        salience: &Salience,
        provenance: &serde_json::Value,
    ) -> Result<Self> {
        salience.validate()?;
        Ok(Self {
            content: codec.seal(content)?,
            tags: codec.seal(&serde_json::to_string(tags)?)?,
            salience: codec.seal(&serde_json::to_string(salience)?)?,
            provenance: codec.seal(&serde_json::to_string(provenance)?)?,
        })
    }
}

/// Insert a memory row with explicit timestamps. Returns the new id.
///
/// Salience is range-checked when sealing; [`remember`] and the import path
/// check content.
pub(crate) fn insert_memory(
    conn: &Connection,
    codec: &FieldCodec,
    memory: &NewMemory,
    created_at: &str,
    updated_at: &str,
) -> Result<i64> {
    let sealed = SealedFields::seal(
        codec,
        &memory.content,
        &memory.tags,
        &memory.salience,
        &memory.provenance,
    )?;

    conn.execute(
        "INSERT INTO memories (kind, content, tags, salience, provenance, pinned, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            memory.kind.as_str(),
            sealed.content,
            sealed.tags,
            sealed.salience,
            sealed.provenance,
            memory.pinned as i64,
            created_at,
            updated_at,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Validate and store a new memory. Content is trimmed; empty content is rejected.
pub fn remember(conn: &Connection, codec: &FieldCodec, memory: &NewMemory) -> Result<i64> {
    let content = memory.content.trim();
    if content.is_empty() {
        return Err(MemoryError::EmptyContent.into());
    }

    let trimmed = NewMemory {
        content: content.to_string(),
        ..memory.clone()
    };
    let now = super::utc_now();
    insert_memory(conn, codec, &trimmed, &now, &now)
}

/// Fetch the raw row for `id`, if any.
pub(crate) fn fetch_raw(conn: &Connection, id: i64) -> Result<Option<RawMemoryRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
            params![id],
            RawMemoryRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn get_memory(conn: &Connection, codec: &FieldCodec, id: i64) -> Result<Option<Memory>> {
    fetch_raw(conn, id)?.map(|raw| raw.decode(codec)).transpose()
}

/// Apply `patch` to memory `id`. Returns `false` if no such memory exists.
///
/// Omitted fields keep their current values; `updated_at` is always rewritten.
pub fn update_memory(
    conn: &mut Connection,
    codec: &FieldCodec,
    id: i64,
    patch: &MemoryPatch,
) -> Result<bool> {
    if let Some(content) = &patch.content {
        if content.trim().is_empty() {
            return Err(MemoryError::EmptyContent.into());
        }
    }

    let tx = conn.transaction()?;
    let Some(raw) = fetch_raw(&tx, id)? else {
        return Ok(false);
    };
    let current = raw.decode(codec)?;

    let content = patch.content.clone().unwrap_or(current.content);
    let kind = patch.kind.unwrap_or(current.kind);
    let tags = patch.tags.clone().unwrap_or(current.tags);
    let salience = patch.salience.unwrap_or(current.salience);
    let provenance = patch.provenance.clone().unwrap_or(current.provenance);
    let pinned = patch.pinned.unwrap_or(current.pinned);

    let sealed = SealedFields::seal(codec, &content, &tags, &salience, &provenance)?;
    tx.execute(
        "UPDATE memories \
         SET content = ?1, kind = ?2, tags = ?3, salience = ?4, provenance = ?5, pinned = ?6, updated_at = ?7 \
         WHERE id = ?8",
        params![
            sealed.content,
            kind.as_str(),
            sealed.tags,
            sealed.salience,
            sealed.provenance,
            pinned as i64,
            super::utc_now(),
            id,
        ],
    )?;
    tx.commit()?;

    Ok(true)
}

/// Hard delete. The FTS index follows via trigger.
pub fn delete_memory(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Secret;
    use crate::db;

    fn sealed_codec() -> FieldCodec {
        FieldCodec::new(Secret::new("store-test-token").as_ref()).unwrap()
    }

    #[test]
    fn remember_and_get_plaintext() {
        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();

        let new = NewMemory::new("  Mum's birthday is 3 March  ")
            .kind(MemoryKind::Semantic)
            .tags(["family", "dates"])
            .provenance(serde_json::json!({"kind": "text"}));
        let id = remember(&conn, &codec, &new).unwrap();

        let memory = get_memory(&conn, &codec, id).unwrap().unwrap();
        assert_eq!(memory.content, "Mum's birthday is 3 March");
        assert_eq!(memory.tags, vec!["family", "dates"]);
        assert_eq!(memory.salience, Salience::default());
        assert_eq!(memory.provenance, serde_json::json!({"kind": "text"}));
        assert!(!memory.pinned);
        assert_eq!(memory.created_at, memory.updated_at);
    }

    #[test]
    fn remember_rejects_blank_content() {
        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();

        for text in ["", "   ", "\n\t"] {
            let err = remember(&conn, &codec, &NewMemory::new(text)).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MemoryError>(),
                Some(MemoryError::EmptyContent)
            ));
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn sealed_columns_are_tagged_blobs() {
        let conn = db::open_memory_database().unwrap();
        let codec = sealed_codec();
        let id = remember(&conn, &codec, &NewMemory::new("spare key under the plant pot")).unwrap();

        let types: (String, String, String, String, String) = conn
            .query_row(
                "SELECT typeof(content), typeof(tags), typeof(salience), typeof(provenance), kind \
                 FROM memories WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .unwrap();
        assert_eq!(types, ("blob".into(), "blob".into(), "blob".into(), "blob".into(), "semantic".into()));

        let memory = get_memory(&conn, &codec, id).unwrap().unwrap();
        assert_eq!(memory.content, "spare key under the plant pot");
    }

    #[test]
    fn update_preserves_untouched_fields() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = sealed_codec();
        let id = remember(
            &conn,
            &codec,
            &NewMemory::new("Bins go out on Tuesday")
                .kind(MemoryKind::Procedural)
                .tags(["chores"]),
        )
        .unwrap();
        let before = get_memory(&conn, &codec, id).unwrap().unwrap();

        assert!(update_memory(&mut conn, &codec, id, &MemoryPatch::pinned(true)).unwrap());

        let after = get_memory(&conn, &codec, id).unwrap().unwrap();
        assert!(after.pinned);
        assert_eq!(after.content, before.content);
        assert_eq!(after.kind, before.kind);
        assert_eq!(after.tags, before.tags);
        assert_eq!(after.salience, before.salience);
        assert!(after.updated_at >= after.created_at);
    }

    #[test]
    fn update_unknown_id_returns_false() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        assert!(!update_memory(&mut conn, &codec, 999, &MemoryPatch::pinned(true)).unwrap());
    }

    #[test]
    fn update_rejects_blank_content() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        let id = remember(&conn, &codec, &NewMemory::new("keep me")).unwrap();

        let patch = MemoryPatch {
            content: Some("  ".into()),
            ..MemoryPatch::default()
        };
        assert!(update_memory(&mut conn, &codec, id, &patch).is_err());
        assert_eq!(get_memory(&conn, &codec, id).unwrap().unwrap().content, "keep me");
    }

    #[test]
    fn remember_rejects_out_of_range_salience() {
        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        remember(&conn, &codec, &NewMemory::new("healthy row")).unwrap();

        for bad in [f64::NAN, 7.0] {
            let new = NewMemory::new("bad row").salience(Salience {
                importance: bad,
                ..Salience::default()
            });
            let err = remember(&conn, &codec, &new).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MemoryError>(),
                Some(MemoryError::InvalidSalience { field: "importance", .. })
            ));
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert!(get_memory(&conn, &codec, 1).unwrap().is_some());
    }

    #[test]
    fn update_rejects_non_finite_salience() {
        let mut conn = db::open_memory_database().unwrap();
        let codec = sealed_codec();
        let id = remember(&conn, &codec, &NewMemory::new("keep me")).unwrap();

        let patch = MemoryPatch {
            salience: Some(Salience {
                relevance: f64::INFINITY,
                ..Salience::default()
            }),
            ..MemoryPatch::default()
        };
        let err = update_memory(&mut conn, &codec, id, &patch).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MemoryError>(),
            Some(MemoryError::InvalidSalience { field: "relevance", .. })
        ));
        let memory = get_memory(&conn, &codec, id).unwrap().unwrap();
        assert_eq!(memory.salience, Salience::default());
    }

    #[test]
    fn delete_reports_existence() {
        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        let id = remember(&conn, &codec, &NewMemory::new("temporary")).unwrap();

        assert!(delete_memory(&conn, id).unwrap());
        assert!(!delete_memory(&conn, id).unwrap());
        assert!(get_memory(&conn, &codec, id).unwrap().is_none());
    }

    #[test]
    fn missing_json_columns_decode_to_defaults() {
        let conn = db::open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO memories (kind, content, created_at, updated_at) \
             VALUES ('episodic', 'legacy row', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let memory = get_memory(&conn, &FieldCodec::plaintext(), 1).unwrap().unwrap();
        assert!(memory.tags.is_empty());
        assert_eq!(memory.salience, Salience::default());
        assert_eq!(memory.provenance, serde_json::json!({}));
    }
}

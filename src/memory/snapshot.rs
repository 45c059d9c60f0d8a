//! Whole-store JSON export and import.
//!
//! A snapshot is `{version, created_at, count, items}` where `items` are the
//! decrypted records in id order. Encrypted stores write the document framed
//! with `ZENC1` to `snapshot_{ts}.json.enc`; plaintext stores write pretty JSON.
//!
//! Import re-inserts every item as a new row. Original ids are not preserved,
//! so importing into a non-empty store never collides.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::crypto::file::{decrypt_bytes, encrypt_bytes, is_framed, write_atomic};
use crate::crypto::{FieldCodec, Secret};
use crate::error::MemoryError;
use crate::memory::store::{insert_memory, RawMemoryRow, MEMORY_COLUMNS};
use crate::memory::types::{Memory, MemoryKind, NewMemory, Salience};

pub const SNAPSHOT_VERSION: &str = "1.1";

/// Fernet tokens always begin with the base64 of version byte `0x80`.
const LEGACY_BLOB_PREFIX: &[u8] = b"gAAAAA";

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub version: String,
    pub created_at: String,
    pub count: usize,
    pub items: Vec<Memory>,
}

/// An item as read back from a snapshot. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnapshotItem {
    kind: Option<String>,
    content: Option<String>,
    tags: Option<Vec<String>>,
    salience: Option<Salience>,
    provenance: Option<serde_json::Value>,
    #[serde(deserialize_with = "loose_bool")]
    pinned: bool,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    items: Vec<SnapshotItem>,
}

/// Accepts `true`/`false`, numbers (non-zero is true) and null.
fn loose_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    })
}

/// Every record, decrypted, in id order.
pub fn export_snapshot(conn: &Connection, codec: &FieldCodec) -> Result<Snapshot> {
    let mut stmt = conn.prepare(&format!("SELECT {MEMORY_COLUMNS} FROM memories ORDER BY id ASC"))?;
    let rows = stmt
        .query_map([], RawMemoryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let items = rows
        .into_iter()
        .map(|raw| raw.decode(codec))
        .collect::<Result<Vec<_>>>()?;

    Ok(Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        created_at: super::utc_now(),
        count: items.len(),
        items,
    })
}

/// Write `snapshot` into `dir` and return the file path.
///
/// Names carry a millisecond UTC stamp. An existing file is never replaced;
/// a `-N` suffix is added instead.
pub fn write_snapshot(dir: &Path, snapshot: &Snapshot, secret: Option<&Secret>) -> Result<PathBuf> {
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
    let json = serde_json::to_string_pretty(snapshot)?;

    let (extension, bytes) = match secret {
        Some(secret) => ("json.enc", encrypt_bytes(secret, json.as_bytes())?),
        None => ("json", json.into_bytes()),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
    let path = unused_snapshot_path(dir, &stamp, extension);
    write_atomic(&path, &bytes)?;
    Ok(path)
}

fn unused_snapshot_path(dir: &Path, stamp: &str, extension: &str) -> PathBuf {
    let path = dir.join(format!("snapshot_{stamp}.{extension}"));
    if !path.exists() {
        return path;
    }
    (1..)
        .map(|n| dir.join(format!("snapshot_{stamp}-{n}.{extension}")))
        .find(|p| !p.exists())
        .unwrap_or(path)
}

/// Load the JSON text of a snapshot file.
///
/// Files ending in `.enc` are decrypted: `ZENC1` framing first, then the older
/// whole-blob Fernet form. Anything else is read as plain UTF-8.
fn read_snapshot_text(path: &Path, codec: &FieldCodec, secret: Option<&Secret>) -> Result<String> {
    let data = std::fs::read(path).with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let encrypted_name = path.extension().is_some_and(|ext| ext == "enc");

    let plain = if !encrypted_name || is_framed(&data) {
        decrypt_bytes(secret, &data)?
    } else if data.starts_with(LEGACY_BLOB_PREFIX) {
        let cipher = codec.cipher().ok_or(MemoryError::Locked)?;
        let token = std::str::from_utf8(&data).map_err(|e| MemoryError::MalformedField(e.to_string()))?;
        cipher.open_legacy(token.trim())?
    } else {
        data
    };
    String::from_utf8(plain).map_err(|e| MemoryError::MalformedField(e.to_string()).into())
}

/// Insert every item from the snapshot at `path` as a new memory.
///
/// The whole import runs in one transaction. Items without content are
/// skipped; an unknown kind or an out-of-range salience aborts the import.
pub fn import_snapshot(
    conn: &mut Connection,
    codec: &FieldCodec,
    secret: Option<&Secret>,
    path: &Path,
) -> Result<usize> {
    let text = read_snapshot_text(path, codec, secret)?;
    let document: SnapshotDocument =
        serde_json::from_str(&text).with_context(|| format!("invalid snapshot {}", path.display()))?;

    let tx = conn.transaction()?;
    let mut inserted = 0;
    for (index, item) in document.items.into_iter().enumerate() {
        let content = item.content.as_deref().map(str::trim).unwrap_or_default();
        if content.is_empty() {
            tracing::warn!(index, "skipping snapshot item without content");
            continue;
        }
        let kind: MemoryKind = match item.kind.as_deref() {
            Some(kind) if !kind.trim().is_empty() => kind.parse()?,
            _ => MemoryKind::default(),
        };

        let now = super::utc_now();
        let memory = NewMemory::new(content)
            .kind(kind)
            .tags(item.tags.unwrap_or_default())
            .salience(item.salience.unwrap_or_default())
            .provenance(item.provenance.unwrap_or_else(|| serde_json::json!({})))
            .pinned(item.pinned);
        let created_at = item.created_at.unwrap_or_else(|| now.clone());
        let updated_at = item.updated_at.unwrap_or(now);
        insert_memory(&tx, codec, &memory, &created_at, &updated_at)?;
        inserted += 1;
    }
    tx.commit()?;
    Ok(inserted)
}

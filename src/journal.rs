//! Append-only audit journal and the bounded working log.
//!
//! The journal gets one JSON object per line in `journal/{YYYY-MM-DD}.jsonl`.
//! With a secret configured each line is the standard-base64 field seal of the
//! JSON text instead, in `{YYYY-MM-DD}.jsonl.enc`.
//!
//! The working log is a small JSON array of recent activity, capped at a fixed
//! number of entries, rewritten atomically on every push.
//!
//! Both are side channels: callers write to them after the database commit and
//! only log failures.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::crypto::file::write_atomic;
use crate::crypto::{FieldCipher, Secret};
use crate::error::MemoryError;

pub const DEFAULT_WORKING_LOG_CAPACITY: usize = 500;

/// Daily JSON-lines audit trail.
pub struct Journal {
    dir: PathBuf,
    cipher: Option<FieldCipher>,
    lock: Mutex<()>,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>, secret: Option<&Secret>) -> Result<Self> {
        Ok(Self {
            dir: dir.into(),
            cipher: secret.map(FieldCipher::new).transpose()?,
            lock: Mutex::new(()),
        })
    }

    /// Path of the journal file for `date` (`YYYY-MM-DD`).
    pub fn file_for(&self, date: &str) -> PathBuf {
        let ext = if self.cipher.is_some() { "jsonl.enc" } else { "jsonl" };
        self.dir.join(format!("{date}.{ext}"))
    }

    /// Append `{ts, id, event, ...fields}` to today's file.
    ///
    /// `fields` must be a JSON object; anything else is recorded under `data`.
    pub fn append(&self, event: &str, fields: Value) -> Result<()> {
        let mut entry = Map::new();
        entry.insert("ts".into(), Value::String(crate::memory::utc_now()));
        entry.insert("id".into(), Value::String(uuid::Uuid::now_v7().to_string()));
        entry.insert("event".into(), Value::String(event.to_string()));
        match fields {
            Value::Object(map) => entry.extend(map),
            Value::Null => {}
            other => {
                entry.insert("data".into(), other);
            }
        }

        let json = serde_json::to_string(&Value::Object(entry))?;
        let line = match &self.cipher {
            Some(cipher) => STANDARD.encode(cipher.seal(json.as_bytes())?),
            None => json,
        };

        let path = self.file_for(&Utc::now().format("%Y-%m-%d").to_string());
        let _guard = self.lock.lock().map_err(|_| anyhow::anyhow!("journal lock poisoned"))?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create journal dir {}", self.dir.display()))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open journal {}", path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// All entries recorded on `date`, oldest first. Undecodable lines are skipped.
    pub fn read_entries(&self, date: &str) -> Result<Vec<Value>> {
        let path = self.file_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read journal {}", path.display()))?;

        let mut entries = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match self.decode_line(line) {
                Ok(value) => entries.push(value),
                Err(e) => tracing::warn!(path = %path.display(), "skipping journal line: {e:#}"),
            }
        }
        Ok(entries)
    }

    fn decode_line(&self, line: &str) -> Result<Value> {
        let json = match &self.cipher {
            Some(cipher) => {
                let sealed = STANDARD
                    .decode(line.trim())
                    .map_err(|e| MemoryError::MalformedField(e.to_string()))?;
                String::from_utf8(cipher.open(&sealed)?)
                    .map_err(|e| MemoryError::MalformedField(e.to_string()))?
            }
            None => line.to_string(),
        };
        Ok(serde_json::from_str(&json)?)
    }
}

/// One working-log record: `{ts, ev, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingLogEntry {
    pub ts: String,
    pub ev: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Fixed-capacity ring of recent activity, stored as a plaintext JSON array.
pub struct WorkingLog {
    path: PathBuf,
    capacity: usize,
    lock: Mutex<()>,
}

impl WorkingLog {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
            lock: Mutex::new(()),
        }
    }

    /// Create the file as an empty array if it is missing.
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.path.exists() {
            write_atomic(&self.path, b"[]")?;
        }
        Ok(())
    }

    /// Record an event, dropping the oldest entries beyond capacity.
    pub fn push(&self, ev: &str, fields: Value) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow::anyhow!("working log lock poisoned"))?;
        let mut entries = self.load();
        entries.push(WorkingLogEntry {
            ts: crate::memory::utc_now(),
            ev: ev.to_string(),
            fields: match fields {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        });
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }
        write_atomic(&self.path, serde_json::to_string(&entries)?.as_bytes())
    }

    /// The newest `limit` entries, oldest first. `0` returns everything.
    pub fn entries(&self, limit: usize) -> Vec<WorkingLogEntry> {
        let entries = self.load();
        if limit == 0 || entries.len() <= limit {
            return entries;
        }
        entries[entries.len() - limit..].to_vec()
    }

    /// A missing or corrupt file reads as empty.
    fn load(&self) -> Vec<WorkingLogEntry> {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), "working log unreadable, starting fresh: {e}");
            Vec::new()
        })
    }
}

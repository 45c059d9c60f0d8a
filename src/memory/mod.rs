//! The memory store.
//!
//! [`MemoryStore`] owns the SQLite connection, the field codec, the audit
//! journal and the working log. Database work happens under one mutex; journal
//! and working-log writes follow the commit and never fail the operation.

pub mod procedural;
pub mod rollup;
pub mod search;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod types;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::config::{MemoryConfig, StoragePaths};
use crate::core_memory::CoreMemoryFile;
use crate::crypto::{FieldCodec, Secret};
use crate::db::{self, HealthReport};
use crate::diary::Diary;
use crate::journal::{Journal, WorkingLog, WorkingLogEntry, DEFAULT_WORKING_LOG_CAPACITY};

use self::stats::StatsResponse;
use self::types::{
    EpisodicRollup, Memory, MemoryPatch, NewMemory, ProceduralOutcome, ProceduralVersion, RecallQuery,
    RollupOutcome,
};

/// Contents of the `VERSION` marker file.
pub const VERSION_MARKER: &str = "mem-schema=1";

/// Current time as ISO 8601 UTC with microseconds, e.g. `2025-03-01T09:30:00.123456Z`.
pub fn utc_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct MemoryStore {
    conn: Mutex<Connection>,
    codec: FieldCodec,
    secret: Option<Secret>,
    paths: StoragePaths,
    journal: Journal,
    working_log: WorkingLog,
}

impl MemoryStore {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, secret: Option<Secret>) -> Result<Self> {
        Self::with_paths(StoragePaths::new(root), secret, DEFAULT_WORKING_LOG_CAPACITY)
    }

    /// Open the store described by `config`.
    pub fn from_config(config: &MemoryConfig, secret: Option<Secret>) -> Result<Self> {
        Self::with_paths(config.storage_paths(), secret, config.working_log.capacity)
    }

    fn with_paths(paths: StoragePaths, secret: Option<Secret>, log_capacity: usize) -> Result<Self> {
        paths.ensure_dirs()?;
        if !paths.version_file.exists() {
            std::fs::write(&paths.version_file, VERSION_MARKER)
                .with_context(|| format!("failed to write {}", paths.version_file.display()))?;
        }

        let working_log = WorkingLog::new(&paths.working_log, log_capacity);
        working_log.ensure_exists()?;

        CoreMemoryFile::new(&paths.core_memory, secret.clone()).ensure_exists()?;

        let conn = db::open_database(&paths.db)?;
        let codec = FieldCodec::new(secret.as_ref())?;
        let journal = Journal::new(&paths.journal_dir, secret.as_ref())?;

        if secret.is_none() {
            tracing::warn!(
                root = %paths.root.display(),
                "no secret token configured; memories are stored in plaintext"
            );
        }
        tracing::info!(db = %paths.db.display(), encrypted = secret.is_some(), "memory store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            codec,
            secret,
            paths,
            journal,
            working_log,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database mutex poisoned"))
    }

    fn journal(&self, event: &str, fields: Value) {
        if let Err(e) = self.journal.append(event, fields) {
            tracing::warn!(event, "journal write failed: {e:#}");
        }
    }

    fn log_working(&self, ev: &str, fields: Value) {
        if let Err(e) = self.working_log.push(ev, fields) {
            tracing::warn!(ev, "working log write failed: {e:#}");
        }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn is_encrypted(&self) -> bool {
        self.codec.is_encrypted()
    }

    /// The personal diary at `{root}/diary.log`, sharing this store's secret.
    pub fn diary(&self) -> Diary {
        Diary::new(&self.paths.diary, self.secret.clone())
    }

    /// The permanent core memory document at `{root}/core_memory.json`.
    pub fn core_memory(&self) -> CoreMemoryFile {
        CoreMemoryFile::new(&self.paths.core_memory, self.secret.clone())
    }

    pub fn remember(&self, memory: &NewMemory) -> Result<i64> {
        let id = store::remember(&*self.conn()?, &self.codec, memory)?;

        let content = if self.is_encrypted() {
            Value::String("[encrypted]".into())
        } else {
            Value::String(memory.content.trim().to_string())
        };
        self.journal(
            "remember",
            json!({
                "row_id": id,
                "kind": memory.kind.as_str(),
                "content": content,
                "tags": memory.tags,
                "salience": memory.salience,
                "provenance": memory.provenance,
                "pinned": memory.pinned,
            }),
        );
        self.log_working("remember", json!({"id": id, "kind": memory.kind.as_str()}));
        Ok(id)
    }

    pub fn recall(&self, query: &RecallQuery) -> Result<Vec<Memory>> {
        search::recall(&*self.conn()?, &self.codec, query)
    }

    pub fn get(&self, id: i64) -> Result<Option<Memory>> {
        store::get_memory(&*self.conn()?, &self.codec, id)
    }

    /// Returns `false` when no memory has this id.
    pub fn update(&self, id: i64, patch: &MemoryPatch) -> Result<bool> {
        let updated = store::update_memory(&mut *self.conn()?, &self.codec, id, patch)?;
        if updated {
            self.journal("update", json!({"row_id": id, "patch": patch.field_names()}));
            self.log_working("update", json!({"id": id}));
        }
        Ok(updated)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let deleted = store::delete_memory(&*self.conn()?, id)?;
        if deleted {
            self.journal("delete", json!({"row_id": id}));
            self.log_working("delete", json!({"id": id}));
        }
        Ok(deleted)
    }

    pub fn pin(&self, id: i64) -> Result<bool> {
        self.update(id, &MemoryPatch::pinned(true))
    }

    pub fn unpin(&self, id: i64) -> Result<bool> {
        self.update(id, &MemoryPatch::pinned(false))
    }

    pub fn stats(&self) -> Result<StatsResponse> {
        stats::memory_stats(
            &*self.conn()?,
            &self.paths.root,
            Some(&self.paths.db),
            self.is_encrypted(),
        )
    }

    /// Export every memory to `snapshots/` and return the file path.
    pub fn snapshot(&self) -> Result<PathBuf> {
        let snap = snapshot::export_snapshot(&*self.conn()?, &self.codec)?;
        let path = snapshot::write_snapshot(&self.paths.snapshots_dir, &snap, self.secret.as_ref())?;

        self.journal("snapshot", json!({"path": path.display().to_string(), "count": snap.count}));
        self.log_working("snapshot", json!({"path": path.display().to_string()}));
        Ok(path)
    }

    /// Insert every item of a snapshot file as new memories. Returns the count.
    pub fn import_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let inserted = snapshot::import_snapshot(&mut *self.conn()?, &self.codec, self.secret.as_ref(), path)?;

        self.journal(
            "import_snapshot",
            json!({"path": path.display().to_string(), "inserted": inserted}),
        );
        self.log_working("import", json!({"n": inserted}));
        Ok(inserted)
    }

    /// Roll up `period` (`YYYY-MM`), defaulting to the current UTC month.
    pub fn rollup_month(&self, period: Option<&str>) -> Result<RollupOutcome> {
        let period = period.map(str::to_string).unwrap_or_else(rollup::current_period);
        let outcome = rollup::rollup_month(&mut *self.conn()?, &self.codec, &period)?;

        if let Some(rollup_id) = outcome.rollup_id {
            self.journal(
                "rollup_month",
                json!({"period": period, "source_count": outcome.source_count, "rollup_id": rollup_id}),
            );
            self.log_working("rollup", json!({"period": period, "count": outcome.source_count}));
        }
        Ok(outcome)
    }

    pub fn rollup(&self, period: &str) -> Result<Option<EpisodicRollup>> {
        rollup::validate_period(period)?;
        rollup::get_rollup(&*self.conn()?, &self.codec, period)
    }

    pub fn upsert_procedural(
        &self,
        subject_tag: &str,
        steps: &[String],
        notes: Option<&str>,
        source_ids: &[i64],
    ) -> Result<ProceduralOutcome> {
        let outcome = procedural::upsert_procedural(
            &mut *self.conn()?,
            &self.codec,
            subject_tag,
            steps,
            notes,
            source_ids,
        )?;

        self.journal(
            "procedural_upsert",
            json!({
                "subject_tag": subject_tag,
                "version": outcome.version,
                "mem_id": outcome.memory_id,
            }),
        );
        self.log_working("procedural", json!({"tag": subject_tag, "v": outcome.version}));
        Ok(outcome)
    }

    pub fn procedural_history(&self, subject_tag: &str) -> Result<Vec<ProceduralVersion>> {
        procedural::procedural_history(&*self.conn()?, &self.codec, subject_tag)
    }

    /// The newest `limit` working-log entries. `0` returns all of them.
    pub fn working_log(&self, limit: usize) -> Vec<WorkingLogEntry> {
        self.working_log.entries(limit)
    }

    pub fn health(&self) -> Result<HealthReport> {
        db::check_database_health(&*self.conn()?)
    }
}

//! Encrypted local memory journal for a personal assistant.
//!
//! Memories are short text records with a kind, tags and a salience profile,
//! stored in SQLite. With a secret token configured every free-text and JSON
//! column is sealed with AES-256-GCM; without one the store runs in plaintext
//! and full-text search goes through FTS5.
//!
//! | Kind | Purpose |
//! |------|---------|
//! | **Procedural** | Versioned playbooks, one live record per subject |
//! | **Semantic** | Facts, knowledge, preferences |
//! | **Episodic** | Things that happened; source for monthly rollups |
//! | **Working** | Short-lived scratch context |
//! | **Event** | Timed occurrences |
//!
//! # Layout on disk
//!
//! ```text
//! {root}/mem.db                    SQLite (WAL)
//! {root}/journal/{date}.jsonl[.enc] audit trail, one line per mutation
//! {root}/snapshots/                JSON exports
//! {root}/working_log.json          last 500 events
//! {root}/diary.log                 free-text diary
//! {root}/core_memory.json          family, laws, skills, events
//! {root}/VERSION
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`core_memory`]: The permanent core memory document
//! - [`crypto`]: Field sealing and whole-file framing
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`memory`]: The store, with write path, recall, stats, snapshots, rollups, playbooks
//! - [`journal`]: Audit journal and working log
//! - [`diary`]: Timestamped diary files

pub mod config;
pub mod core_memory;
pub mod crypto;
pub mod db;
pub mod diary;
pub mod error;
pub mod journal;
pub mod memory;

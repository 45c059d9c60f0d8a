//! Permanent core memory: family facts, laws, skills and events.
//!
//! Stored as one JSON document at `{base}/core_memory.json`, framed with
//! `ZENC1` when a secret is configured. Missing sections are filled from the
//! default schema on load and on save; unknown top-level keys are kept.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::crypto::file::{read_text, write_text};
use crate::crypto::Secret;
use crate::error::MemoryError;

/// The list-valued sections of [`CoreMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreSection {
    Laws,
    Skills,
    Events,
}

impl std::str::FromStr for CoreSection {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "laws" | "law" => Ok(Self::Laws),
            "skills" | "skill" => Ok(Self::Skills),
            "events" | "event" => Ok(Self::Events),
            other => Err(MemoryError::UnknownCoreSection(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreMemory {
    #[serde(default)]
    pub family: Map<String, Value>,
    #[serde(default)]
    pub laws: Vec<Value>,
    #[serde(default)]
    pub skills: Vec<Value>,
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CoreMemory {
    pub fn section_mut(&mut self, section: CoreSection) -> &mut Vec<Value> {
        match section {
            CoreSection::Laws => &mut self.laws,
            CoreSection::Skills => &mut self.skills,
            CoreSection::Events => &mut self.events,
        }
    }
}

pub struct CoreMemoryFile {
    path: PathBuf,
    secret: Option<Secret>,
}

impl CoreMemoryFile {
    pub fn new(path: impl Into<PathBuf>, secret: Option<Secret>) -> Self {
        Self {
            path: path.into(),
            secret,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the default schema if the file does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.path.exists() {
            self.save(&CoreMemory::default())?;
        }
        Ok(())
    }

    /// Missing or blank files load as the default schema. A document that is
    /// not a JSON object is replaced by the default with a warning.
    pub fn load(&self) -> Result<CoreMemory> {
        if !self.path.exists() {
            return Ok(CoreMemory::default());
        }
        let text = read_text(&self.path, self.secret.as_ref())?;
        if text.trim().is_empty() {
            return Ok(CoreMemory::default());
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| MemoryError::MalformedField(format!("core memory: {e}")))?;
        if !value.is_object() {
            tracing::warn!(path = %self.path.display(), "core memory is not an object, using defaults");
            return Ok(CoreMemory::default());
        }
        serde_json::from_value(value)
            .map_err(|e| MemoryError::MalformedField(format!("core memory: {e}")).into())
    }

    pub fn save(&self, core: &CoreMemory) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(core)?;
        write_text(&self.path, &json, self.secret.as_ref())?;
        tracing::debug!(path = %self.path.display(), "core memory saved");
        Ok(())
    }

    /// Append `entry` to a list section and save. Returns the updated document.
    pub fn append(&self, section: CoreSection, entry: &str) -> Result<CoreMemory> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(MemoryError::EmptyContent.into());
        }
        let mut core = self.load()?;
        core.section_mut(section).push(Value::String(entry.to_string()));
        self.save(&core)?;
        Ok(core)
    }

    /// Set `family[key] = value` and save.
    pub fn set_family(&self, key: &str, value: Value) -> Result<CoreMemory> {
        let key = key.trim();
        if key.is_empty() {
            return Err(MemoryError::EmptyContent.into());
        }
        let mut core = self.load()?;
        core.family.insert(key.to_string(), value);
        self.save(&core)?;
        Ok(core)
    }
}

//! Timestamped free-text diary.
//!
//! Each entry is one line, `[{ts}] {entry}`. The file is rewritten whole on
//! every append, framed with `ZENC1` when a secret is configured. Reads accept
//! both framed and plaintext files.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::crypto::file::{read_text, write_text};
use crate::crypto::Secret;
use crate::error::MemoryError;

pub struct Diary {
    path: PathBuf,
    secret: Option<Secret>,
}

impl Diary {
    pub fn new(path: impl Into<PathBuf>, secret: Option<Secret>) -> Self {
        Self {
            path: path.into(),
            secret,
        }
    }

    /// The diary kept alongside a project, at `{project}/diary/diary.log`.
    pub fn for_project(project_dir: impl AsRef<Path>, secret: Option<Secret>) -> Self {
        Self::new(project_dir.as_ref().join("diary").join("diary.log"), secret)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &str) -> Result<()> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(MemoryError::EmptyContent.into());
        }

        let mut text = self.read_all()?;
        text.push_str(&format!("[{}] {}\n", crate::memory::utc_now(), entry));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_text(&self.path, &text, self.secret.as_ref())?;
        tracing::debug!(path = %self.path.display(), "diary entry appended");
        Ok(())
    }

    /// The last `last` non-blank lines, oldest first. `0` returns every line.
    pub fn read(&self, last: usize) -> Result<Vec<String>> {
        let text = self.read_all()?;
        let lines: Vec<String> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        if last == 0 || lines.len() <= last {
            return Ok(lines);
        }
        Ok(lines[lines.len() - last..].to_vec())
    }

    fn read_all(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        read_text(&self.path, self.secret.as_ref())
    }
}

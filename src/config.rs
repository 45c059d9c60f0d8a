use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Env vars consulted for the base directory, in priority order.
pub const ROOT_ENV_VARS: [&str; 2] = ["ZANDALEE_MEMORY_ROOT", "ZANDALEE_MEM_DIR"];

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MemoryConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub recall: RecallConfig,
    pub working_log: WorkingLogConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Explicit base directory. Wins over the environment when set.
    pub root: Option<String>,
    pub db_name: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecallConfig {
    pub default_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkingLogConfig {
    pub capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            db_name: "mem.db".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self { default_k: 10 }
    }
}

impl Default for WorkingLogConfig {
    fn default() -> Self {
        Self { capacity: 500 }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Returns `~/Documents/Zandalee/zandalee_memories`
pub fn default_memory_root() -> PathBuf {
    home_dir()
        .join("Documents")
        .join("Zandalee")
        .join("zandalee_memories")
}

/// Returns the default config file path: `~/.zandalee/memory.toml`
pub fn default_config_path() -> PathBuf {
    home_dir().join(".zandalee").join("memory.toml")
}

impl MemoryConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemoryConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (ZANDALEE_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ZANDALEE_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Base directory: explicit config, then [`ROOT_ENV_VARS`], then the default.
    pub fn resolved_root(&self) -> PathBuf {
        if let Some(root) = self.storage.root.as_deref().filter(|r| !r.is_empty()) {
            return expand_tilde(root);
        }
        ROOT_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|val| !val.is_empty())
            .map(|val| expand_tilde(&val))
            .unwrap_or_else(default_memory_root)
    }

    pub fn storage_paths(&self) -> StoragePaths {
        StoragePaths::with_db_name(self.resolved_root(), &self.storage.db_name)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// On-disk layout under the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub root: PathBuf,
    pub db: PathBuf,
    pub journal_dir: PathBuf,
    pub snapshots_dir: PathBuf,
    pub working_log: PathBuf,
    pub version_file: PathBuf,
    pub diary: PathBuf,
    pub core_memory: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_db_name(root, "mem.db")
    }

    pub fn with_db_name(root: impl Into<PathBuf>, db_name: &str) -> Self {
        let root = root.into();
        Self {
            db: root.join(db_name),
            journal_dir: root.join("journal"),
            snapshots_dir: root.join("snapshots"),
            working_log: root.join("working_log.json"),
            version_file: root.join("VERSION"),
            diary: root.join("diary.log"),
            core_memory: root.join("core_memory.json"),
            root,
        }
    }

    /// Create the base, journal and snapshot directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.root, &self.journal_dir, &self.snapshots_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

//! File system paths for authctl.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Name of the per-user base directory under `$HOME`.
const BASE_DIR_NAME: &str = ".authctl";

/// Manages file system paths for authctl.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.authctl)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.authctl`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Config file path (~/.authctl/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Persisted credential file (~/.authctl/credentials.json).
    pub fn credentials_file(&self) -> PathBuf {
        self.base_dir.join("credentials.json")
    }

    /// Logs directory (~/.authctl/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// JSONL log file (~/.authctl/logs/authctl.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("authctl.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

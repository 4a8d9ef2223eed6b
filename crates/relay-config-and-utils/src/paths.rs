//! On-disk layout under the relay home directory.
//!
//! ```text
//! ~/.robot-relay/
//!   config.json
//!   relay.sqlite
//!   logs/
//! ```

use crate::{CoreError, CoreResult};
use std::fs;
use std::path::{Path, PathBuf};

const HOME_DIR: &str = ".robot-relay";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Layout rooted at `~/.robot-relay`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("no home directory for the current user".into()))?;
        Ok(Self::with_base_dir(home.join(HOME_DIR)))
    }

    /// Layout rooted at `root`, as given by `--base-dir` or in tests.
    pub fn with_base_dir(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn base_dir(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// SQLite outbox used when no Redis URL is configured.
    pub fn database_file(&self) -> PathBuf {
        self.root.join("relay.sqlite")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create the home and log directories if missing.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

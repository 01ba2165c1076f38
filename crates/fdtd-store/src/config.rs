//! Where cached data lives and how runs are retried.
//!
//! Layout:
//! ```text
//! <base>/                       (--data-dir > $FDTD_DATA_DIR > ~/.fdtd-cache)
//! ├── config.toml
//! ├── <database>.db
//! ├── savefiles/<database>/<database>_<id>.fsp
//! └── simulations/<folder>/<name>.fsp
//! ```

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::store::ResultStore;

pub const DATA_DIR_ENV: &str = "FDTD_DATA_DIR";
pub const DEFAULT_DATABASE: &str = "results";
pub const DEFAULT_ATTEMPTS: u32 = 3;
const CONFIG_FILE: &str = "config.toml";
const SAVE_EXTENSION: &str = "fsp";

fn default_base_dir() -> PathBuf {
    dirs_home().join(".fdtd-cache")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Base directory: explicit override, then `$FDTD_DATA_DIR`, then
/// `~/.fdtd-cache`.
pub fn resolve_base_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    env::var_os(DATA_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_base_dir)
}

/// Make a name safe to use as a file stem.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn default_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}

/// What to do when the engine fails a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RetryPolicy {
    /// Try up to `attempts` times before aborting.
    Bounded {
        #[serde(default = "default_attempts")]
        attempts: u32,
    },
    /// Abort on the first failure.
    FailFast,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Bounded {
            attempts: DEFAULT_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(self) -> u32 {
        match self {
            RetryPolicy::Bounded { attempts } => attempts.max(1),
            RetryPolicy::FailFast => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: String,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database: DEFAULT_DATABASE.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Read `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(StoreConfig::default());
        }
        let text = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&text)
            .map_err(|e| StoreError::InvalidData(format!("bad config {}: {e}", path.display())))
    }
}

/// Paths for one database under a resolved base directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    base: PathBuf,
    database: String,
    config: StoreConfig,
}

impl DataLayout {
    /// Resolve the base directory, read its config and create the
    /// directories. `database` overrides the configured database name.
    pub fn open(base_dir: Option<&Path>, database: Option<&str>) -> Result<Self> {
        let base = resolve_base_dir(base_dir);
        let config = StoreConfig::load(&base.join(CONFIG_FILE))?;
        let database = sanitize_name(database.unwrap_or(&config.database));
        if database.is_empty() {
            return Err(StoreError::InvalidData("database name is empty".into()));
        }

        let layout = DataLayout {
            base,
            database,
            config,
        };
        for dir in [layout.savefile_dir(), layout.base.join("simulations")] {
            fs::create_dir_all(&dir).map_err(|e| {
                StoreError::InvalidData(format!("failed to create {}: {e}", dir.display()))
            })?;
        }
        tracing::debug!("data layout at {}", layout.base.display());
        Ok(layout)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.base.join(format!("{}.db", self.database))
    }

    pub fn savefile_dir(&self) -> PathBuf {
        self.base.join("savefiles").join(&self.database)
    }

    /// Engine save state of record `id`.
    pub fn savefile_path(&self, id: i64) -> PathBuf {
        savefile_path(&self.savefile_dir(), &self.database, id)
    }

    /// Working file for a named simulation, grouped by folder.
    pub fn simulation_path(&self, folder: &str, name: &str) -> PathBuf {
        self.base
            .join("simulations")
            .join(sanitize_name(folder))
            .join(format!("{}.{SAVE_EXTENSION}", sanitize_name(name)))
    }

    pub fn open_store(&self) -> Result<ResultStore> {
        ResultStore::open(&self.db_path())
    }
}

pub(crate) fn savefile_path(dir: &Path, database: &str, id: i64) -> PathBuf {
    dir.join(format!("{database}_{id}.{SAVE_EXTENSION}"))
}

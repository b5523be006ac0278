//! Runtime configuration resolved from the environment with defaults under the
//! user's home directory.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use directories::BaseDirs;

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".thanilocal";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "thanilocal.sqlite";
const LOG_FILE_NAME: &str = "thanilocal.log";
const SESSION_FILE_NAME: &str = "session";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Root of the local media buckets.
    pub media_dir: PathBuf,
    pub export_dir: PathBuf,
    pub log_file: PathBuf,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Remembers the last signed-in email between runs.
    pub session_file: PathBuf,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary key lookup. `THANILOCAL_HOME`
    /// relocates every default; the other keys override single paths.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("THANILOCAL_HOME") {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_data_dir()?,
        };

        let db_path = lookup("THANILOCAL_DB")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DB_FILE_NAME));
        let log_file = lookup("THANILOCAL_LOG_FILE")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(LOG_FILE_NAME));
        let log_level = lookup("THANILOCAL_LOG")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            media_dir: data_dir.join("media"),
            export_dir: data_dir.join("exports"),
            session_file: data_dir.join(SESSION_FILE_NAME),
            data_dir,
            db_path,
            log_file,
            log_level,
        })
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}

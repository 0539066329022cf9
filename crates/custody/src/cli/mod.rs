//! CLI module for Custody
//!
//! Each command builds its own Tokio runtime and opens the state database
//! itself; nothing runs before the command is known.

pub mod output;
pub mod project;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use custody::CustodyConfig;
use std::path::{Path, PathBuf};

/// Default config file location: `$CUSTODY_HOME/config.toml`
pub fn default_config_path() -> PathBuf {
    custody_logging::custody_home().join("config.toml")
}

/// Resolve the effective configuration.
///
/// An explicit `--config` must exist. Without one, the default file is used
/// when present, otherwise built-in defaults.
pub fn load_config(explicit: Option<&Path>, database: Option<PathBuf>) -> Result<CustodyConfig> {
    let mut config = match explicit {
        Some(path) => CustodyConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                CustodyConfig::load(&default_path).with_context(|| {
                    format!("Failed to load config: {}", default_path.display())
                })?
            } else {
                CustodyConfig::default()
            }
        }
    };

    if let Some(database) = database {
        config.database_path = database;
    }
    Ok(config)
}

/// Current-thread runtime for short database commands.
pub(crate) fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")
}

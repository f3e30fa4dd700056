//! # Configuration Module
//!
//! Data directory discovery and the runtime configuration for Encore.
//!
//! ## Data Storage
//!
//! Encore keeps its database and optional config file in the
//! platform-standard data directory:
//! - Linux: `~/.local/share/encore/`
//! - macOS: `~/Library/Application Support/encore/`
//! - Windows: `%APPDATA%\encore\`
//!
//! ## Config File
//!
//! `config.json` in that directory may override any engine setting; missing
//! keys keep their defaults:
//!
//! ```json
//! { "engine": { "max_depth": 3, "friend_window_days": 14 } }
//! ```

use crate::engine::EngineConfig;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "encore";
const DB_FILE: &str = "encore.db";
const CONFIG_FILE: &str = "config.json";

/// Returns the platform-appropriate data directory for Encore, creating it
/// when missing.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The encore subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let app_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create Encore data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Returns the default database file path (`<data dir>/encore/encore.db`).
///
/// # Errors
///
/// Same as [`get_data_dir`].
///
/// # Examples
///
/// ```no_run
/// use encore::config::get_db_path;
///
/// let db_path = get_db_path()?;
/// println!("Database location: {}", db_path.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(DB_FILE))
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Database file; `None` means the one in the data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Recommendation engine tuning
    pub engine: EngineConfig,
}

impl RuntimeConfig {
    /// Load `config.json` from the data directory, or defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory is unusable or the config
    /// file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&get_data_dir()?.join(CONFIG_FILE))
    }

    /// Load the configuration at `path`, or defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Create configuration with explicit database path
    #[must_use]
    pub fn with_db_path(mut self, db_path: PathBuf) -> Self {
        self.db_path = Some(db_path);
        self
    }

    /// The database file to open: the configured one, or the default in the
    /// data directory.
    ///
    /// # Errors
    ///
    /// Same as [`get_db_path`] when no path is configured.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => get_db_path(),
        }
    }
}

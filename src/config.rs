// File: ./src/config.rs
// Handles configuration loading, saving, defaults and startup validation.
use crate::context::AppContext;
use crate::storage::LocalStorage;
use anyhow::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

fn default_file_suffix() -> String {
    ".todo.md".to_string()
}

fn default_section_header() -> String {
    "## Added in Reminders".to_string()
}

fn default_scan_interval() -> u64 {
    60
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Directory scanned for checklist files. May be given on the command line instead.
    #[serde(default)]
    pub watch_root: Option<PathBuf>,
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
    /// Heading under which items created in the store are appended.
    #[serde(default = "default_section_header")]
    pub section_header: String,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Overrides the reminders store location (defaults to the data dir).
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_to_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_root: None,
            file_suffix: default_file_suffix(),
            section_header: default_section_header(),
            scan_interval_secs: default_scan_interval(),
            debounce_ms: default_debounce_ms(),
            store_path: None,
            log_level: default_log_level(),
            log_to_file: false,
        }
    }
}

/// Validated settings the scanner runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    /// Canonicalized watch root.
    pub root: PathBuf,
    pub file_suffix: String,
    pub section_header: String,
    pub scan_interval: Duration,
    pub debounce: Duration,
}

impl Config {
    /// Load the configuration from disk using an explicit context.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_config_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    /// Unreadable or malformed files are still errors.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(config) => Ok(config),
            Err(e) if Self::is_missing_config_error(&e) => {
                log::debug!("No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Detects whether an error means "the config file is not there".
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    /// Save configuration using an explicit context.
    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_config_file_path()?;
        LocalStorage::with_lock(&path, || {
            let toml_str = toml::to_string_pretty(self)?;
            LocalStorage::atomic_write(&path, toml_str)?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn get_path_string(ctx: &dyn AppContext) -> Result<String> {
        let path = ctx.get_config_file_path()?;
        Ok(path.to_string_lossy().to_string())
    }

    /// Where the reminders store lives: `store_path` if set, else the context default.
    pub fn store_path(&self, ctx: &dyn AppContext) -> Result<PathBuf> {
        match &self.store_path {
            Some(p) => Ok(p.clone()),
            None => ctx.get_store_path(),
        }
    }

    /// Checks the settings needed to scan and resolves the watch root.
    ///
    /// `root_override` (from the command line) wins over `watch_root`.
    /// Every failure here is a configuration error and should stop the process.
    pub fn watch_settings(&self, root_override: Option<PathBuf>) -> Result<WatchSettings> {
        let root = root_override
            .or_else(|| self.watch_root.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("No watch root configured: set `watch_root` or pass a directory")
            })?;

        if !root.is_dir() {
            anyhow::bail!("Watch root '{}' is missing or not a directory", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve watch root '{}'", root.display()))?;

        if self.file_suffix.trim().is_empty() {
            anyhow::bail!("`file_suffix` must not be empty");
        }
        if self.section_header.trim().is_empty() {
            anyhow::bail!("`section_header` must not be empty");
        }
        if self.scan_interval_secs == 0 {
            anyhow::bail!("`scan_interval_secs` must be at least 1");
        }

        Ok(WatchSettings {
            root,
            file_suffix: self.file_suffix.clone(),
            section_header: self.section_header.trim().to_string(),
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            debounce: Duration::from_millis(self.debounce_ms),
        })
    }
}

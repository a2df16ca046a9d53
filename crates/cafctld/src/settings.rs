//! Persisted daemon preferences.
//!
//! Settings live in a TOML file under the user config directory and are
//! rewritten whenever an option, alarm, lid preference, or duration
//! changes. Load is tolerant: a missing or unreadable file yields
//! defaults so the daemon always starts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use cafctl_core::{KeepAwakeOptions, DEFAULT_DURATION_SECS};

/// Errors that can occur persisting settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to write settings to {path}: {error}")]
    Write { path: PathBuf, error: String },

    #[error("Failed to serialize settings: {0}")]
    Serialize(String),

    #[error("No config directory available")]
    NoConfigDir,
}

/// All persisted preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub display_sleep: bool,
    pub idle_sleep: bool,
    pub disk_sleep: bool,
    pub system_sleep: bool,
    pub user_active: bool,

    /// The user wants lid-closed sleep disabled during sessions.
    pub lid_sleep_disabled: bool,

    /// The heat-buildup warning was confirmed once; don't ask again.
    pub lid_warning_acknowledged: bool,

    pub alarm_enabled: bool,

    /// Duration reused by `start` without an explicit argument.
    pub last_duration_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_sleep: false,
            idle_sleep: true,
            disk_sleep: false,
            system_sleep: false,
            user_active: false,
            lid_sleep_disabled: false,
            lid_warning_acknowledged: false,
            alarm_enabled: false,
            last_duration_secs: DEFAULT_DURATION_SECS,
        }
    }
}

impl Settings {
    /// The caffeinate options these settings select.
    pub fn options(&self) -> KeepAwakeOptions {
        KeepAwakeOptions {
            display_sleep: self.display_sleep,
            idle_sleep: self.idle_sleep,
            disk_sleep: self.disk_sleep,
            system_sleep: self.system_sleep,
            user_active: self.user_active,
        }
    }

    /// Copies option flags back for persistence.
    pub fn set_options(&mut self, options: &KeepAwakeOptions) {
        self.display_sleep = options.display_sleep;
        self.idle_sleep = options.idle_sleep;
        self.disk_sleep = options.disk_sleep;
        self.system_sleep = options.system_sleep;
        self.user_active = options.user_active;
    }
}

/// Loads and saves [`Settings`] at a fixed path.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The default settings location under the user config directory.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|dir| dir.join("cafctl").join("settings.toml"))
            .ok_or(SettingsError::NoConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings, falling back to defaults on any problem.
    pub fn load(&self) -> Settings {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file, using defaults");
                return Settings::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read settings, using defaults");
                return Settings::default();
            }
        };

        match toml::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed settings file, using defaults");
                Settings::default()
            }
        }
    }

    /// Writes settings, creating parent directories as needed.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let contents =
            toml::to_string_pretty(settings).map_err(|e| SettingsError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Write {
                path: self.path.clone(),
                error: e.to_string(),
            })?;
        }

        std::fs::write(&self.path, contents).map_err(|e| SettingsError::Write {
            path: self.path.clone(),
            error: e.to_string(),
        })?;

        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

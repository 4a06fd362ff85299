//! Application settings document
//!
//! One JSON file holding connection defaults and the default parameter set
//! applied to a blank edit session. Independent of the named preset store.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::preset::ModelParams;
use crate::constants::{config, defaults};
use crate::error::{IoResultExt, Result};

/// Persisted application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default)]
    pub last_connected_server: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub default_params: ModelParams,
}

fn default_api_url() -> String {
    defaults::API_URL.to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_connect: false,
            last_connected_server: String::new(),
            api_url: default_api_url(),
            default_params: ModelParams::default(),
        }
    }
}

impl AppSettings {
    /// Server to use for auto-connect: last successful one, else the configured URL
    pub fn auto_connect_target(&self) -> &str {
        if self.last_connected_server.is_empty() {
            &self.api_url
        } else {
            &self.last_connected_server
        }
    }
}

/// Owns the settings file path and the in-memory settings
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: AppSettings,
}

impl SettingsStore {
    pub fn default_path() -> PathBuf {
        config_dir().join(config::SETTINGS_FILENAME)
    }

    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load settings or create default ones.
    ///
    /// A missing file is created immediately so it always exists after the
    /// first run. A malformed file is left untouched and defaults are used in
    /// memory so the user can inspect it.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        info!(path = %path.display(), "Reading settings");

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "Settings file not found, writing defaults");
                let store = Self {
                    path,
                    settings: AppSettings::default(),
                };
                if let Err(err) = store.save() {
                    error!(error = %err, "Failed to write default settings");
                }
                return Ok(store);
            }
            Err(err) => return Err(err).with_path("read settings from", &path),
        };

        let settings = match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => {
                info!(api_url = %settings.api_url, auto_connect = settings.auto_connect, "Loaded settings");
                settings
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "Failed to parse settings, using defaults");
                AppSettings::default()
            }
        };

        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Replace the in-memory settings without persisting
    pub fn replace(&mut self, settings: AppSettings) {
        self.settings = settings;
    }

    /// Write the current settings as indented JSON
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_path("create settings directory", parent)?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|source| {
            crate::error::Error::Parse {
                path: self.path.clone(),
                source,
            }
        })?;

        fs::write(&self.path, json).with_path("write settings to", &self.path)?;

        info!(path = %self.path.display(), "Saved settings");
        Ok(())
    }

    /// Record the server after a successful connection
    pub fn set_last_connected_server(&mut self, url: &str) -> Result<()> {
        self.settings.last_connected_server = url.to_string();
        self.save()
    }

    /// Toggle auto-connect. Enabling also remembers the configured URL.
    pub fn set_auto_connect(&mut self, enabled: bool) -> Result<()> {
        self.settings.auto_connect = enabled;
        if enabled {
            self.settings.last_connected_server = self.settings.api_url.clone();
        }
        self.save()?;
        info!(auto_connect = enabled, "Auto-connect setting saved");
        Ok(())
    }

    pub fn set_api_url(&mut self, url: &str) -> Result<()> {
        self.settings.api_url = url.trim_end_matches('/').to_string();
        self.save()
    }

    pub fn set_default_params(&mut self, params: ModelParams) -> Result<()> {
        self.settings.default_params = params;
        self.save()
    }
}

/// `<user config dir>/tabload`, falling back to the working directory
pub fn config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(config::APP_DIR);
    path
}

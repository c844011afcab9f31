//! Connection settings and their persistence

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::api::StatusPayload;
use crate::config::DEFAULT_SCRIPT_URL;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access settings file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse settings JSON: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),
}

/// Widget account settings as stored by the host.
///
/// Field names on disk follow the host's plugin parameter names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(rename = "site_id", default)]
    pub identifier: String,
    #[serde(rename = "script_url", default = "default_script_url")]
    pub script_endpoint: String,
    #[serde(rename = "account_email", default)]
    pub account_label: String,
}

fn default_script_url() -> String {
    DEFAULT_SCRIPT_URL.to_string()
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            identifier: String::new(),
            script_endpoint: default_script_url(),
            account_label: String::new(),
        }
    }
}

impl ConnectionSettings {
    /// Build the settings to persist from a successful status check
    pub fn from_payload(payload: &StatusPayload) -> Self {
        ConnectionSettings {
            identifier: payload.identifier.clone(),
            script_endpoint: payload
                .script_endpoint
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(default_script_url),
            account_label: payload.account_label.clone().unwrap_or_default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.identifier.trim().is_empty()
    }

    /// The embeddable script tag, or None when not connected
    pub fn snippet(&self) -> Option<String> {
        if !self.is_connected() {
            return None;
        }
        Some(format!(
            r#"<script src="{}" data-widget-id="{}" async></script>"#,
            self.script_endpoint, self.identifier
        ))
    }

    pub fn status_line(&self) -> String {
        match (self.is_connected(), self.account_label.is_empty()) {
            (true, false) => format!("Connected as {}", self.account_label),
            (true, true) => "Connected".to_string(),
            (false, _) => "Not connected".to_string(),
        }
    }

    /// Replace empty stored values with defaults
    fn normalized(mut self) -> Self {
        if self.script_endpoint.trim().is_empty() {
            self.script_endpoint = default_script_url();
        }
        self
    }
}

/// Key/value settings storage owned by the host
pub trait SettingsStore {
    fn load(&self) -> Result<ConnectionSettings, SettingsError>;
    fn save(&self, settings: &ConnectionSettings) -> Result<(), SettingsError>;
}

/// Default settings file path, relative to the config dir
const DEFAULT_SETTINGS_PATH: &str = "widget-connect/settings.json";

/// Expand ~ to home directory
pub(crate) fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Get the default settings file path
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(DEFAULT_SETTINGS_PATH))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
}

/// Settings persisted as a JSON document on disk
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    /// If `path` is None, uses the default path under the user config dir
    pub fn new(path: Option<&str>) -> Self {
        let path = match path {
            Some(p) => expand_path(p),
            None => default_settings_path(),
        };
        FileSettingsStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<ConnectionSettings, SettingsError> {
        if !self.path.exists() {
            return Ok(ConnectionSettings::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        let settings: ConnectionSettings = serde_json::from_str(&contents)?;
        Ok(settings.normalized())
    }

    fn save(&self, settings: &ConnectionSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(settings)?;
        // Write then rename so a reader never sees a half-written document
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process store, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<Mutex<ConnectionSettings>>,
}

impl MemorySettingsStore {
    pub fn new(settings: ConnectionSettings) -> Self {
        MemorySettingsStore {
            inner: Arc::new(Mutex::new(settings)),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<ConnectionSettings, SettingsError> {
        self.inner
            .lock()
            .map(|s| s.clone())
            .map_err(|e| SettingsError::Unavailable(e.to_string()))
    }

    fn save(&self, settings: &ConnectionSettings) -> Result<(), SettingsError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| SettingsError::Unavailable(e.to_string()))?;
        *guard = settings.clone();
        Ok(())
    }
}

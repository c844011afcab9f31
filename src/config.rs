//! Configuration management

use serde::Deserialize;
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::settings::expand_path;

/// Default configuration values
pub const DEFAULT_SCRIPT_URL: &str = "https://asyntai.com/static/js/chat-widget.js";
const DEFAULT_AUTH_URL: &str = "https://asyntai.com/wp-auth";
const DEFAULT_STATUS_URL: &str = "https://asyntai.com/connect-status.js";
const DEFAULT_DASHBOARD_URL: &str = "https://asyntai.com/dashboard";
const DEFAULT_PLATFORM: &str = "datocms";
const DEFAULT_TOKEN_PREFIX: &str = "datocms_";
const DEFAULT_MAX_ATTEMPTS: u32 = 60;
const DEFAULT_INITIAL_DELAY_MS: u64 = 800;
const DEFAULT_MANUAL_DELAY_MS: u64 = 1000;
const DEFAULT_WATCHDOG_MS: u64 = 3000;
const DEFAULT_ERROR_RETRY_MS: u64 = 1000;
const DEFAULT_RETRY_MS: u64 = 500;
const DEFAULT_WINDOW_WIDTH: u32 = 800;
const DEFAULT_WINDOW_HEIGHT: u32 = 720;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Plugin configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth_url: String,
    pub status_url: String,
    pub dashboard_url: String,
    pub platform: String,
    pub token_prefix: String,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub manual_delay_ms: u64,
    pub watchdog_ms: u64,
    pub error_retry_ms: u64,
    pub retry_ms: u64,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            status_url: DEFAULT_STATUS_URL.to_string(),
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
            platform: DEFAULT_PLATFORM.to_string(),
            token_prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            manual_delay_ms: DEFAULT_MANUAL_DELAY_MS,
            watchdog_ms: DEFAULT_WATCHDOG_MS,
            error_retry_ms: DEFAULT_ERROR_RETRY_MS,
            retry_ms: DEFAULT_RETRY_MS,
            window_width: DEFAULT_WINDOW_WIDTH,
            window_height: DEFAULT_WINDOW_HEIGHT,
        }
    }
}

impl Config {
    /// Load configuration overrides from a JSON file
    ///
    /// Fields missing from the file keep their defaults. If `path` is None,
    /// the defaults are returned unchanged.
    pub fn load(path: Option<&str>) -> Result<Config, ConfigError> {
        let config = match path {
            Some(p) => {
                let contents = fs::read_to_string(expand_path(p))?;
                serde_json::from_str(&contents)?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.watchdog_ms == 0 {
            return Err(ConfigError::Invalid("watchdog_ms must be positive".into()));
        }
        for (name, url) in [("auth_url", &self.auth_url), ("status_url", &self.status_url)] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ConfigError::Invalid(format!("{name} is not an http(s) URL")));
            }
        }
        Ok(())
    }

    /// Timing parameters for the handshake state machine
    pub fn timing(&self) -> Timing {
        Timing {
            max_attempts: self.max_attempts,
            error_retry: Duration::from_millis(self.error_retry_ms),
            retry: Duration::from_millis(self.retry_ms),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn manual_delay(&self) -> Duration {
        Duration::from_millis(self.manual_delay_ms)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }
}

/// Attempt budget and retry delays used while polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub max_attempts: u32,
    /// Delay after a watchdog expiry or network failure
    pub error_retry: Duration,
    /// Delay after an empty result or a failed save
    pub retry: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Config::default().timing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_handshake_policy() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 60);
        assert_eq!(config.initial_delay(), Duration::from_millis(800));
        assert_eq!(config.watchdog(), Duration::from_millis(3000));
        let timing = config.timing();
        assert_eq!(timing.error_retry, Duration::from_millis(1000));
        assert_eq!(timing.retry, Duration::from_millis(500));
    }

    #[test]
    fn test_load_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_attempts": 5, "platform": "custom"}}"#).unwrap();

        let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.platform, "custom");
        assert_eq!(config.status_url, DEFAULT_STATUS_URL);
    }

    #[test]
    fn test_load_rejects_zero_attempts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_attempts": 0}}"#).unwrap();

        let err = Config::load(Some(file.path().to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_none_is_default() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
    }
}

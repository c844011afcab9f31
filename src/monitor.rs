//! File monitoring for settings changes made outside this controller

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to create file watcher: {0}")]
    WatcherError(String),
    #[error("Failed to watch path: {0}")]
    PathError(String),
}

pub struct SettingsMonitor {
    _watcher: RecommendedWatcher,
    _handle: thread::JoinHandle<()>,
}

impl SettingsMonitor {
    /// Watch the directory holding `settings_path`
    ///
    /// The directory is watched rather than the file because saves replace
    /// the file by rename. When the settings file is created or modified,
    /// sets the `changed` flag to true. The caller should poll this flag
    /// and reset it after handling.
    pub fn new(settings_path: &Path, changed: Arc<Mutex<bool>>) -> Result<Self, MonitorError> {
        let file_name = settings_path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| MonitorError::PathError(settings_path.display().to_string()))?;
        let watch_dir = match settings_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx): (_, Receiver<Result<Event, notify::Error>>) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| MonitorError::WatcherError(e.to_string()))?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| MonitorError::PathError(e.to_string()))?;

        let handle = thread::spawn(move || {
            for event in rx.into_iter().flatten() {
                use notify::EventKind::*;
                let relevant = matches!(event.kind, Create(_) | Modify(_))
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if relevant {
                    log::debug!("Settings file changed");
                    if let Ok(mut flag) = changed.lock() {
                        *flag = true;
                    }
                }
            }
        });

        Ok(SettingsMonitor {
            _watcher: watcher,
            _handle: handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_is_path_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing/settings.json");
        let result = SettingsMonitor::new(&path, Arc::new(Mutex::new(false)));
        assert!(matches!(result, Err(MonitorError::PathError(_))));
    }

    #[test]
    fn test_watch_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert!(SettingsMonitor::new(&path, Arc::new(Mutex::new(false))).is_ok());
    }
}

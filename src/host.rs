//! Collaborators supplied by the host platform

use std::time::Duration;

use crate::handshake::Phase;

/// Size of the authorization window; the host centers it on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFeatures {
    pub width: u32,
    pub height: u32,
}

/// Notification, dialog and window services of the host.
///
/// Notices and alerts are fire-and-forget.
pub trait Host {
    fn notice(&self, text: &str);
    fn alert(&self, text: &str);
    fn confirm(&self, text: &str) -> bool;
    /// Open a new top-level window. Returns false if it was blocked.
    fn open_window(&self, url: &str, features: &WindowFeatures) -> bool;
    /// Open a link in a new tab or the default browser
    fn open_url(&self, url: &str) -> bool;
    fn copy_to_clipboard(&self, text: &str) -> Result<(), String>;
    /// Called on every handshake transition while a connect is running
    fn progress(&self, _phase: Phase, _attempt: u32, _status: &str) {}
}

/// Waits between poll attempts
pub trait Timer {
    fn sleep(&self, delay: Duration);
}

/// Blocks the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTimer;

impl Timer for ThreadTimer {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

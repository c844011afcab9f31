//! Drives the handshake against the host and the remote endpoints

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::api::{self, StatusEndpoint, StatusPayload};
use crate::config::Config;
use crate::handshake::{Handshake, HandshakeError, Next, Outcome, Phase};
use crate::host::{Host, Timer, WindowFeatures};
use crate::settings::{ConnectionSettings, SettingsError, SettingsStore};
use crate::token::CorrelationToken;

pub const POPUP_BLOCKED_MESSAGE: &str = "Popup blocked. Please allow popups and try again.";
pub const TIMEOUT_MESSAGE: &str =
    "Connection timeout. Please try again or open the connect window manually.";
pub const CONNECTED_MESSAGE: &str = "Connected successfully!";
pub const RESET_CONFIRM_MESSAGE: &str = "Are you sure you want to disconnect the chat widget?";
pub const RESET_MESSAGE: &str = "Settings reset successfully";
pub const COPIED_MESSAGE: &str = "Code copied to clipboard";

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    InFlight(#[from] HandshakeError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Not connected")]
    NotConnected,
    #[error("Copy failed: {0}")]
    Clipboard(String),
}

/// Flag that stops a running handshake from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The settings page controller: current settings plus one handshake
pub struct ConnectController {
    config: Config,
    settings: ConnectionSettings,
    handshake: Handshake,
    store: Box<dyn SettingsStore>,
    endpoint: Box<dyn StatusEndpoint>,
    host: Box<dyn Host>,
    timer: Box<dyn Timer>,
    cancel: CancelHandle,
}

impl ConnectController {
    /// Create a controller, reading the stored settings
    pub fn new(
        config: Config,
        store: Box<dyn SettingsStore>,
        endpoint: Box<dyn StatusEndpoint>,
        host: Box<dyn Host>,
        timer: Box<dyn Timer>,
    ) -> Result<Self, ConnectError> {
        let settings = store.load()?;
        Ok(ConnectController {
            handshake: Handshake::new(config.timing()),
            config,
            settings,
            store,
            endpoint,
            host,
            timer,
            cancel: CancelHandle::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn is_connected(&self) -> bool {
        self.settings.is_connected()
    }

    pub fn snippet(&self) -> Option<String> {
        self.settings.snippet()
    }

    pub fn status_line(&self) -> String {
        self.settings.status_line()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) -> Result<(), ConnectError> {
        let timing = crate::config::Timing {
            max_attempts,
            ..self.handshake.timing()
        };
        self.handshake.set_timing(timing)?;
        self.config.max_attempts = max_attempts;
        Ok(())
    }

    /// Re-read the settings store, e.g. after the file changed on disk
    pub fn reload(&mut self) -> Result<(), ConnectError> {
        self.settings = self.store.load()?;
        Ok(())
    }

    /// Open the authorization window and poll until the handshake ends
    pub fn initiate(&mut self) -> Result<Outcome, ConnectError> {
        let token = CorrelationToken::generate(&self.config.token_prefix);
        let next = self.handshake.begin(token.clone(), self.config.initial_delay())?;
        self.cancel.clear();
        self.report_progress();

        let url = api::authorization_url(&self.config, &token);
        let features = WindowFeatures {
            width: self.config.window_width,
            height: self.config.window_height,
        };
        if !self.host.open_window(&url, &features) {
            log::error!("Popup blocked");
            self.handshake.abort();
            self.report_progress();
            self.host.alert(POPUP_BLOCKED_MESSAGE);
            return Ok(Outcome::PopupBlocked);
        }

        Ok(self.drive(next))
    }

    /// Fallback for hosts that block popups: show the link, then poll
    pub fn connect_manually(&mut self) -> Result<Outcome, ConnectError> {
        let token = CorrelationToken::generate(&self.config.token_prefix);
        let next = self.handshake.begin(token.clone(), self.config.manual_delay())?;
        self.cancel.clear();
        self.report_progress();

        let url = api::authorization_url(&self.config, &token);
        self.host
            .notice(&format!("Open this link to authorize the connection: {url}"));
        Ok(self.drive(next))
    }

    /// Write the account from a successful status check
    pub fn persist(&mut self, payload: &StatusPayload) -> bool {
        let settings = ConnectionSettings::from_payload(payload);
        match self.store.save(&settings) {
            Ok(()) => {
                self.settings = settings;
                self.host.notice(CONNECTED_MESSAGE);
                true
            }
            Err(e) => {
                log::warn!("Save error: {}", e);
                self.host.alert(&format!("Connection failed: {e}"));
                false
            }
        }
    }

    /// Disconnect after the user confirms. Returns false if declined.
    pub fn reset(&mut self) -> Result<bool, ConnectError> {
        if !self.host.confirm(RESET_CONFIRM_MESSAGE) {
            return Ok(false);
        }

        let defaults = ConnectionSettings::default();
        if let Err(e) = self.store.save(&defaults) {
            self.host.alert(&format!("Reset failed: {e}"));
            return Err(e.into());
        }
        self.settings = defaults;
        self.host.notice(RESET_MESSAGE);
        Ok(true)
    }

    /// Put the snippet on the host clipboard
    pub fn copy_snippet(&self) -> Result<String, ConnectError> {
        let snippet = self.snippet().ok_or(ConnectError::NotConnected)?;
        match self.host.copy_to_clipboard(&snippet) {
            Ok(()) => {
                self.host.notice(COPIED_MESSAGE);
                Ok(snippet)
            }
            Err(e) => {
                self.host.alert(&format!("Copy failed: {e}"));
                Err(ConnectError::Clipboard(e))
            }
        }
    }

    pub fn open_dashboard(&self) -> bool {
        self.host.open_url(&self.config.dashboard_url)
    }

    fn drive(&mut self, mut next: Next) -> Outcome {
        loop {
            next = match next {
                Next::Schedule(delay) => {
                    if !self.wait(delay) {
                        self.handshake.abort();
                        self.report_progress();
                        return Outcome::Cancelled;
                    }
                    self.handshake.poll_due()
                }
                Next::Check(ticket) => {
                    log::debug!("Checking status, attempt {}", ticket.attempt);
                    let check = self.endpoint.check(&ticket.token, &ticket.callback);
                    self.handshake.resolve_check(&ticket, check)
                }
                Next::Persist(ticket, payload) => {
                    let saved = self.persist(&payload);
                    self.handshake.resolve_persist(&ticket, saved)
                }
                Next::Finished(outcome) => {
                    if outcome == Outcome::TimedOut {
                        self.host.alert(TIMEOUT_MESSAGE);
                    }
                    return outcome;
                }
                Next::Ignore => {
                    return match self.handshake.phase() {
                        Phase::Connected => Outcome::Connected,
                        Phase::TimedOut => Outcome::TimedOut,
                        Phase::Idle | Phase::Waiting => Outcome::Cancelled,
                    };
                }
            };
            if next != Next::Ignore {
                self.report_progress();
            }
        }
    }

    fn report_progress(&self) {
        self.host.progress(
            self.handshake.phase(),
            self.handshake.attempt(),
            self.handshake.status_message(),
        );
    }

    /// Returns false if cancelled before or during the wait
    fn wait(&self, delay: Duration) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.timer.sleep(delay);
        !self.cancel.is_cancelled()
    }
}

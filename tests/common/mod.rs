//! In-process stand-ins for the host and the remote status endpoint.
//!
//! The fake endpoint answers with scripted JSONP bodies and runs them through
//! the same parser as the HTTP endpoint, so tests cover the body handling
//! without a network.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use widget_connect_core::api::{parse_status_body, ApiError, StatusCheck, StatusEndpoint};
use widget_connect_core::host::{Host, Timer, WindowFeatures};
use widget_connect_core::settings::{
    ConnectionSettings, MemorySettingsStore, SettingsError, SettingsStore,
};
use widget_connect_core::token::CorrelationToken;

/// Everything the controller showed or asked the host to do
#[derive(Debug, Default)]
pub struct HostLog {
    pub notices: Vec<String>,
    pub alerts: Vec<String>,
    pub windows: Vec<(String, WindowFeatures)>,
    pub clipboard: Option<String>,
}

pub struct FakeHost {
    pub log: Rc<RefCell<HostLog>>,
    pub popup_allowed: bool,
}

impl FakeHost {
    pub fn new(popup_allowed: bool) -> (Self, Rc<RefCell<HostLog>>) {
        let log = Rc::new(RefCell::new(HostLog::default()));
        (
            FakeHost {
                log: Rc::clone(&log),
                popup_allowed,
            },
            log,
        )
    }
}

impl Host for FakeHost {
    fn notice(&self, text: &str) {
        self.log.borrow_mut().notices.push(text.to_string());
    }

    fn alert(&self, text: &str) {
        self.log.borrow_mut().alerts.push(text.to_string());
    }

    fn confirm(&self, _text: &str) -> bool {
        true
    }

    fn open_window(&self, url: &str, features: &WindowFeatures) -> bool {
        self.log
            .borrow_mut()
            .windows
            .push((url.to_string(), *features));
        self.popup_allowed
    }

    fn open_url(&self, _url: &str) -> bool {
        true
    }

    fn copy_to_clipboard(&self, text: &str) -> Result<(), String> {
        self.log.borrow_mut().clipboard = Some(text.to_string());
        Ok(())
    }
}

/// One scripted reply from the status endpoint
pub enum Reply {
    /// Body template; `{cb}` is replaced with the attempt's callback name
    Body(&'static str),
    Timeout,
    NetworkError,
}

/// Status endpoint replaying scripted replies, then "not yet authorized"
pub struct FakeStatusServer {
    replies: RefCell<VecDeque<Reply>>,
    pub requests: Rc<RefCell<Vec<(String, String)>>>,
}

impl FakeStatusServer {
    pub fn new(replies: Vec<Reply>) -> (Self, Rc<RefCell<Vec<(String, String)>>>) {
        let requests = Rc::new(RefCell::new(Vec::new()));
        (
            FakeStatusServer {
                replies: RefCell::new(replies.into()),
                requests: Rc::clone(&requests),
            },
            requests,
        )
    }
}

impl StatusEndpoint for FakeStatusServer {
    fn check(&self, token: &CorrelationToken, callback: &str) -> StatusCheck {
        self.requests
            .borrow_mut()
            .push((token.to_string(), callback.to_string()));

        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or(Reply::Body("{cb}({})"));
        match reply {
            Reply::Timeout => StatusCheck::NoResponse,
            Reply::NetworkError => StatusCheck::Failed("connection refused".into()),
            Reply::Body(template) => {
                match parse_status_body(&template.replace("{cb}", callback), callback) {
                    Ok(Some(payload)) => StatusCheck::Authorized(payload),
                    Ok(None) | Err(ApiError::ParseError(_)) => StatusCheck::Pending,
                    Err(ApiError::CallbackMismatch(_)) => StatusCheck::NoResponse,
                }
            }
        }
    }
}

/// Records requested waits instead of sleeping
pub struct FakeTimer(pub Rc<RefCell<Vec<Duration>>>);

impl FakeTimer {
    pub fn new() -> (Self, Rc<RefCell<Vec<Duration>>>) {
        let sleeps = Rc::new(RefCell::new(Vec::new()));
        (FakeTimer(Rc::clone(&sleeps)), sleeps)
    }
}

impl Timer for FakeTimer {
    fn sleep(&self, delay: Duration) {
        self.0.borrow_mut().push(delay);
    }
}

/// In-memory store whose first save fails as if the disk were unavailable
pub struct FlakyStore {
    inner: MemorySettingsStore,
    failed: Cell<bool>,
}

impl FlakyStore {
    pub fn new() -> (Self, MemorySettingsStore) {
        let inner = MemorySettingsStore::default();
        (
            FlakyStore {
                inner: inner.clone(),
                failed: Cell::new(false),
            },
            inner,
        )
    }
}

impl SettingsStore for FlakyStore {
    fn load(&self) -> Result<ConnectionSettings, SettingsError> {
        self.inner.load()
    }

    fn save(&self, settings: &ConnectionSettings) -> Result<(), SettingsError> {
        if !self.failed.replace(true) {
            return Err(SettingsError::Unavailable("disk".into()));
        }
        self.inner.save(settings)
    }
}

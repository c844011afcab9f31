//! FFI boundary definitions for C interop

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;
use std::sync::{Arc, Mutex};

use crate::api::HttpStatusEndpoint;
use crate::config::Config;
use crate::controller::{CancelHandle, ConnectController, ConnectError};
use crate::handshake::{Outcome, Phase};
use crate::host::{Host, ThreadTimer, WindowFeatures};
use crate::monitor::SettingsMonitor;
use crate::settings::FileSettingsStore;

/// Host callback receiving a message
pub type CTextCallback = Option<extern "C" fn(user_data: *mut c_void, text: *const c_char)>;
/// Host callback answering yes/no for a message or URL
pub type CTextPredicate =
    Option<extern "C" fn(user_data: *mut c_void, text: *const c_char) -> bool>;
/// Host callback opening a sized window; returns false if blocked
pub type COpenWindowCallback = Option<
    extern "C" fn(user_data: *mut c_void, url: *const c_char, width: u32, height: u32) -> bool,
>;

/// Host callback receiving handshake progress; `status` is only valid during the call
pub type CProgressCallback = Option<
    extern "C" fn(user_data: *mut c_void, phase: CPhase, attempt: u32, status: *const c_char),
>;

/// Services supplied by the host shell. Any entry may be null.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CHostCallbacks {
    /// Passed back unchanged to every callback
    pub user_data: *mut c_void,
    pub notice: CTextCallback,
    pub alert: CTextCallback,
    /// Null means "declined"
    pub confirm: CTextPredicate,
    /// Null means "blocked"
    pub open_window: COpenWindowCallback,
    pub open_url: CTextPredicate,
    pub copy_to_clipboard: CTextPredicate,
    /// Invoked on the connecting thread on every handshake transition
    pub progress: CProgressCallback,
}

struct FfiHost {
    callbacks: CHostCallbacks,
}

fn to_cstring(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

impl Host for FfiHost {
    fn notice(&self, text: &str) {
        match self.callbacks.notice {
            Some(cb) => cb(self.callbacks.user_data, to_cstring(text).as_ptr()),
            None => log::info!("{}", text),
        }
    }

    fn alert(&self, text: &str) {
        match self.callbacks.alert {
            Some(cb) => cb(self.callbacks.user_data, to_cstring(text).as_ptr()),
            None => log::warn!("{}", text),
        }
    }

    fn confirm(&self, text: &str) -> bool {
        self.callbacks
            .confirm
            .map_or(false, |cb| cb(self.callbacks.user_data, to_cstring(text).as_ptr()))
    }

    fn open_window(&self, url: &str, features: &WindowFeatures) -> bool {
        self.callbacks.open_window.map_or(false, |cb| {
            cb(
                self.callbacks.user_data,
                to_cstring(url).as_ptr(),
                features.width,
                features.height,
            )
        })
    }

    fn open_url(&self, url: &str) -> bool {
        self.callbacks
            .open_url
            .map_or(false, |cb| cb(self.callbacks.user_data, to_cstring(url).as_ptr()))
    }

    fn copy_to_clipboard(&self, text: &str) -> Result<(), String> {
        match self.callbacks.copy_to_clipboard {
            Some(cb) if cb(self.callbacks.user_data, to_cstring(text).as_ptr()) => Ok(()),
            Some(_) => Err("host clipboard rejected the text".to_string()),
            None => Err("no clipboard available".to_string()),
        }
    }

    fn progress(&self, phase: Phase, attempt: u32, status: &str) {
        if let Some(cb) = self.callbacks.progress {
            cb(
                self.callbacks.user_data,
                phase.into(),
                attempt,
                to_cstring(status).as_ptr(),
            );
        }
    }
}

/// Opaque handle to the Rust core state
pub struct WidgetConnectCore {
    controller: ConnectController,
    settings_path: PathBuf,
    monitor: Option<SettingsMonitor>,
    settings_changed: Arc<Mutex<bool>>,
}

/// Stored settings returned to C
#[repr(C)]
pub struct CSettingsInfo {
    /// External account key (owned by Rust, valid until next call)
    pub identifier: *const c_char,
    /// Widget script URL (owned by Rust, valid until next call)
    pub script_endpoint: *const c_char,
    /// Account email (owned by Rust, valid until next call)
    pub account_label: *const c_char,
    pub connected: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CPhase {
    Idle = 0,
    Waiting = 1,
    Connected = 2,
    TimedOut = 3,
}

impl From<Phase> for CPhase {
    fn from(p: Phase) -> Self {
        match p {
            Phase::Idle => CPhase::Idle,
            Phase::Waiting => CPhase::Waiting,
            Phase::Connected => CPhase::Connected,
            Phase::TimedOut => CPhase::TimedOut,
        }
    }
}

/// Handshake progress returned to C
#[repr(C)]
pub struct CHandshakeInfo {
    pub phase: CPhase,
    /// Attempts made for the current token
    pub attempt: u32,
    /// Status text (owned by Rust, valid until next call)
    pub status_message: *const c_char,
}

/// How a connect call ended
#[repr(C)]
pub enum CConnectOutcome {
    Connected = 0,
    TimedOut = 1,
    PopupBlocked = 2,
    Cancelled = 3,
    InFlight = 4,
    InvalidCore = 5,
}

/// Result codes
#[repr(C)]
pub enum CResultCode {
    Ok = 0,
    InvalidArgument = 1,
    Declined = 2,
    NotConnected = 3,
    StoreError = 4,
    ClipboardError = 5,
    InFlight = 6,
    MonitorError = 7,
}

impl From<ConnectError> for CResultCode {
    fn from(e: ConnectError) -> Self {
        match e {
            ConnectError::InFlight(_) => CResultCode::InFlight,
            ConnectError::Settings(_) => CResultCode::StoreError,
            ConnectError::NotConnected => CResultCode::NotConnected,
            ConnectError::Clipboard(_) => CResultCode::ClipboardError,
        }
    }
}

impl From<Outcome> for CConnectOutcome {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Connected => CConnectOutcome::Connected,
            Outcome::TimedOut => CConnectOutcome::TimedOut,
            Outcome::PopupBlocked => CConnectOutcome::PopupBlocked,
            Outcome::Cancelled => CConnectOutcome::Cancelled,
        }
    }
}

// Static storage for strings returned to C
// These are overwritten on each call, so C code must copy if needed
thread_local! {
    static IDENTIFIER: RefCell<Option<CString>> = RefCell::new(None);
    static SCRIPT_ENDPOINT: RefCell<Option<CString>> = RefCell::new(None);
    static ACCOUNT_LABEL: RefCell<Option<CString>> = RefCell::new(None);
    static SNIPPET: RefCell<Option<CString>> = RefCell::new(None);
    static STATUS_MESSAGE: RefCell<Option<CString>> = RefCell::new(None);
}

fn stash(
    slot: &'static std::thread::LocalKey<RefCell<Option<CString>>>,
    text: &str,
) -> *const c_char {
    slot.with(|cell| {
        let cstring = to_cstring(text);
        let ptr = cstring.as_ptr();
        *cell.borrow_mut() = Some(cstring);
        ptr
    })
}

unsafe fn optional_str(s: *const c_char) -> Result<Option<String>, ()> {
    if s.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(s)
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|_| ())
}

/// Create a new core instance and load the stored settings
///
/// `settings_path` may be null for the default path. Returns null on failure.
///
/// # Safety
/// `settings_path` must be a valid C string or null. Returns a pointer that
/// must be freed with `widget_connect_core_free`
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_new(
    settings_path: *const c_char,
    callbacks: CHostCallbacks,
) -> *mut WidgetConnectCore {
    let path_str = match optional_str(settings_path) {
        Ok(p) => p,
        Err(()) => return ptr::null_mut(),
    };

    let config = Config::default();
    let store = FileSettingsStore::new(path_str.as_deref());
    let settings_path = store.path().to_path_buf();
    let controller = ConnectController::new(
        config.clone(),
        Box::new(store),
        Box::new(HttpStatusEndpoint::new(&config)),
        Box::new(FfiHost { callbacks }),
        Box::new(ThreadTimer),
    );

    match controller {
        Ok(controller) => Box::into_raw(Box::new(WidgetConnectCore {
            controller,
            settings_path,
            monitor: None,
            settings_changed: Arc::new(Mutex::new(false)),
        })),
        Err(e) => {
            log::error!("Failed to load settings: {}", e);
            ptr::null_mut()
        }
    }
}

/// Free the core instance
///
/// # Safety
/// `core` must be a valid pointer returned by `widget_connect_core_new`
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_free(core: *mut WidgetConnectCore) {
    if !core.is_null() {
        drop(Box::from_raw(core));
    }
}

/// Whether a widget account is connected
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_is_connected(core: *const WidgetConnectCore) -> bool {
    core.as_ref()
        .map_or(false, |c| c.controller.is_connected())
}

/// Get the stored settings
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_get_settings(
    core: *const WidgetConnectCore,
) -> CSettingsInfo {
    let core = match core.as_ref() {
        Some(c) => c,
        None => {
            return CSettingsInfo {
                identifier: ptr::null(),
                script_endpoint: ptr::null(),
                account_label: ptr::null(),
                connected: false,
            }
        }
    };

    let settings = core.controller.settings();
    CSettingsInfo {
        identifier: stash(&IDENTIFIER, &settings.identifier),
        script_endpoint: stash(&SCRIPT_ENDPOINT, &settings.script_endpoint),
        account_label: stash(&ACCOUNT_LABEL, &settings.account_label),
        connected: settings.is_connected(),
    }
}

/// Get the embeddable script tag, or null when not connected
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_get_snippet(
    core: *const WidgetConnectCore,
) -> *const c_char {
    match core.as_ref().and_then(|c| c.controller.snippet()) {
        Some(snippet) => stash(&SNIPPET, &snippet),
        None => ptr::null(),
    }
}

/// Get the handshake state left by the last connect
///
/// Progress during a running connect is delivered through the `progress`
/// host callback instead.
///
/// # Safety
/// `core` must be valid and no connect may be running on it
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_get_handshake(
    core: *const WidgetConnectCore,
) -> CHandshakeInfo {
    let core = match core.as_ref() {
        Some(c) => c,
        None => {
            return CHandshakeInfo {
                phase: CPhase::Idle,
                attempt: 0,
                status_message: ptr::null(),
            }
        }
    };

    let handshake = core.controller.handshake();
    CHandshakeInfo {
        phase: handshake.phase().into(),
        attempt: handshake.attempt(),
        status_message: stash(&STATUS_MESSAGE, handshake.status_message()),
    }
}

/// Open the authorization window and poll until connected (blocking)
///
/// Run this off the host's UI thread; use a cancel handle to stop it and
/// the `progress` callback to follow it.
///
/// # Safety
/// `core` must be valid. The core is borrowed exclusively until this
/// returns: no other `widget_connect_core_*` call may use it meanwhile.
/// Only the cancel handle functions are safe from other threads
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_connect(
    core: *mut WidgetConnectCore,
) -> CConnectOutcome {
    match core.as_mut() {
        Some(c) => match c.controller.initiate() {
            Ok(outcome) => outcome.into(),
            Err(_) => CConnectOutcome::InFlight,
        },
        None => CConnectOutcome::InvalidCore,
    }
}

/// Like `widget_connect_core_connect`, but the link is sent as a notice
/// instead of opening a window (blocking)
///
/// # Safety
/// Same exclusive-access rule as `widget_connect_core_connect`
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_connect_manual(
    core: *mut WidgetConnectCore,
) -> CConnectOutcome {
    match core.as_mut() {
        Some(c) => match c.controller.connect_manually() {
            Ok(outcome) => outcome.into(),
            Err(_) => CConnectOutcome::InFlight,
        },
        None => CConnectOutcome::InvalidCore,
    }
}

/// Get a handle that cancels a running connect from another thread
///
/// # Safety
/// `core` must be valid. The handle must be freed with
/// `widget_connect_cancel_free` and may outlive `core`
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_cancel_handle(
    core: *const WidgetConnectCore,
) -> *mut CancelHandle {
    match core.as_ref() {
        Some(c) => Box::into_raw(Box::new(c.controller.cancel_handle())),
        None => ptr::null_mut(),
    }
}

/// Request cancellation of the running connect
///
/// # Safety
/// `handle` must be a valid pointer returned by
/// `widget_connect_core_cancel_handle`
#[no_mangle]
pub unsafe extern "C" fn widget_connect_cancel_trigger(handle: *const CancelHandle) {
    if let Some(handle) = handle.as_ref() {
        handle.cancel();
    }
}

/// Free a cancel handle
///
/// # Safety
/// `handle` must be a valid pointer returned by
/// `widget_connect_core_cancel_handle`
#[no_mangle]
pub unsafe extern "C" fn widget_connect_cancel_free(handle: *mut CancelHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Disconnect after host confirmation
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_reset(core: *mut WidgetConnectCore) -> CResultCode {
    let core = match core.as_mut() {
        Some(c) => c,
        None => return CResultCode::InvalidArgument,
    };

    match core.controller.reset() {
        Ok(true) => CResultCode::Ok,
        Ok(false) => CResultCode::Declined,
        Err(e) => e.into(),
    }
}

/// Copy the snippet through the host clipboard callback
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_copy_snippet(
    core: *const WidgetConnectCore,
) -> CResultCode {
    let core = match core.as_ref() {
        Some(c) => c,
        None => return CResultCode::InvalidArgument,
    };

    match core.controller.copy_snippet() {
        Ok(_) => CResultCode::Ok,
        Err(e) => e.into(),
    }
}

/// Open the widget dashboard through the host
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_open_dashboard(
    core: *const WidgetConnectCore,
) -> bool {
    core.as_ref()
        .map_or(false, |c| c.controller.open_dashboard())
}

/// Re-read the settings file
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_reload_settings(
    core: *mut WidgetConnectCore,
) -> CResultCode {
    match core.as_mut() {
        Some(c) => match c.controller.reload() {
            Ok(()) => CResultCode::Ok,
            Err(e) => e.into(),
        },
        None => CResultCode::InvalidArgument,
    }
}

/// Start monitoring the settings file for changes
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_start_monitor(
    core: *mut WidgetConnectCore,
) -> CResultCode {
    let core = match core.as_mut() {
        Some(c) => c,
        None => return CResultCode::InvalidArgument,
    };

    // Stop existing monitor
    core.monitor = None;

    let changed_flag = Arc::clone(&core.settings_changed);
    match SettingsMonitor::new(&core.settings_path, changed_flag) {
        Ok(monitor) => {
            core.monitor = Some(monitor);
            CResultCode::Ok
        }
        Err(e) => {
            log::warn!("{}", e);
            CResultCode::MonitorError
        }
    }
}

/// Stop monitoring the settings file
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_stop_monitor(core: *mut WidgetConnectCore) {
    if let Some(core) = core.as_mut() {
        core.monitor = None;
    }
}

/// Check if the settings file has changed since last check
/// Resets the flag after checking
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_settings_changed(
    core: *mut WidgetConnectCore,
) -> bool {
    let core = match core.as_mut() {
        Some(c) => c,
        None => return false,
    };

    match core.settings_changed.lock() {
        Ok(mut changed) => std::mem::replace(&mut *changed, false),
        Err(_) => false,
    }
}

/// Set configuration value: maximum poll attempts per connect
///
/// # Safety
/// `core` must be valid
#[no_mangle]
pub unsafe extern "C" fn widget_connect_core_set_max_attempts(
    core: *mut WidgetConnectCore,
    max_attempts: u32,
) -> CResultCode {
    let core = match core.as_mut() {
        Some(c) => c,
        None => return CResultCode::InvalidArgument,
    };
    if max_attempts == 0 {
        return CResultCode::InvalidArgument;
    }

    match core.controller.set_max_attempts(max_attempts) {
        Ok(()) => CResultCode::Ok,
        Err(e) => e.into(),
    }
}

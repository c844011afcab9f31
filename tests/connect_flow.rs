mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{FakeHost, FakeStatusServer, FakeTimer, FlakyStore, Reply};
use widget_connect_core::config::Config;
use widget_connect_core::settings::{FileSettingsStore, SettingsStore};
use widget_connect_core::{ConnectController, ConnectionSettings, Outcome, Phase};

const AUTHORIZED: &str = r#"{cb}({"site_id":"abc123","script_url":"https://example.com/w.js","account_email":"owner@example.com"});"#;

fn millis(sleeps: &[Duration]) -> Vec<u128> {
    sleeps.iter().map(Duration::as_millis).collect()
}

#[test]
fn connects_after_pending_and_failed_checks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let (host, log) = FakeHost::new(true);
    let (server, requests) = FakeStatusServer::new(vec![
        Reply::Body("{cb}()"),
        Reply::Timeout,
        Reply::Body(r#"{cb}({"account_email":"owner@example.com"})"#),
        Reply::NetworkError,
        Reply::Body("someOtherCallback({})"),
        Reply::Body(AUTHORIZED),
    ]);
    let (timer, sleeps) = FakeTimer::new();

    let mut controller = ConnectController::new(
        Config::default(),
        Box::new(FileSettingsStore::new(path.to_str())),
        Box::new(server),
        Box::new(host),
        Box::new(timer),
    )
    .unwrap();
    assert!(!controller.is_connected());

    assert_eq!(controller.initiate().unwrap(), Outcome::Connected);
    assert_eq!(controller.handshake().phase(), Phase::Connected);
    assert_eq!(controller.handshake().attempt(), 6);
    assert_eq!(
        millis(&sleeps.borrow()),
        vec![800, 500, 1000, 500, 1000, 1000]
    );

    // Every check used the token from the authorization window
    let log = log.borrow();
    let (window_url, features) = &log.windows[0];
    assert_eq!((features.width, features.height), (800, 720));
    let requests = requests.borrow();
    let token = &requests[0].0;
    assert!(window_url.ends_with(&format!("state={token}")));
    assert!(requests.iter().all(|(t, _)| t == token));

    // Callback names never repeat between attempts
    let callbacks: HashSet<&String> = requests.iter().map(|(_, cb)| cb).collect();
    assert_eq!(callbacks.len(), 6);

    assert!(log.alerts.is_empty());
    assert_eq!(log.notices, vec!["Connected successfully!"]);

    // Persisted for the next page load
    let stored = FileSettingsStore::new(path.to_str()).load().unwrap();
    assert!(stored.is_connected());
    assert_eq!(stored.account_label, "owner@example.com");
    assert_eq!(
        controller.snippet().as_deref(),
        Some(r#"<script src="https://example.com/w.js" data-widget-id="abc123" async></script>"#)
    );
}

#[test]
fn failed_save_retries_with_same_token() {
    let (host, log) = FakeHost::new(true);
    let (server, requests) =
        FakeStatusServer::new(vec![Reply::Body(AUTHORIZED), Reply::Body(AUTHORIZED)]);
    let (timer, sleeps) = FakeTimer::new();
    let (store, saved) = FlakyStore::new();

    let mut controller = ConnectController::new(
        Config::default(),
        Box::new(store),
        Box::new(server),
        Box::new(host),
        Box::new(timer),
    )
    .unwrap();

    assert_eq!(controller.initiate().unwrap(), Outcome::Connected);
    assert_eq!(controller.handshake().attempt(), 2);
    assert_eq!(millis(&sleeps.borrow()), vec![800, 500]);

    let requests = requests.borrow();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].0, requests[1].0);

    let log = log.borrow();
    assert_eq!(
        log.alerts,
        vec!["Connection failed: Settings store unavailable: disk"]
    );
    assert_eq!(log.notices, vec!["Connected successfully!"]);
    assert_eq!(saved.load().unwrap().identifier, "abc123");
}

#[test]
fn times_out_after_sixty_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let (host, log) = FakeHost::new(true);
    let (server, requests) = FakeStatusServer::new(vec![]);
    let (timer, sleeps) = FakeTimer::new();

    let mut controller = ConnectController::new(
        Config::default(),
        Box::new(FileSettingsStore::new(dir.path().join("s.json").to_str())),
        Box::new(server),
        Box::new(host),
        Box::new(timer),
    )
    .unwrap();

    assert_eq!(controller.initiate().unwrap(), Outcome::TimedOut);
    assert_eq!(requests.borrow().len(), 60);
    // initial delay plus one wait after each of the 60 checks
    assert_eq!(sleeps.borrow().len(), 61);
    assert_eq!(log.borrow().alerts.len(), 1);
    assert!(log.borrow().alerts[0].starts_with("Connection timeout"));
    assert!(!controller.is_connected());

    // A new attempt starts over with a fresh token
    let first_token = requests.borrow()[0].0.clone();
    controller.set_max_attempts(1).unwrap();
    assert_eq!(controller.initiate().unwrap(), Outcome::TimedOut);
    assert_ne!(requests.borrow()[60].0, first_token);
}

#[test]
fn reset_and_copy_through_host() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let store = FileSettingsStore::new(path.to_str());
    store
        .save(&ConnectionSettings {
            identifier: "abc123".into(),
            script_endpoint: "https://example.com/custom.js".into(),
            account_label: String::new(),
        })
        .unwrap();

    let (host, log) = FakeHost::new(true);
    let (server, _) = FakeStatusServer::new(vec![]);
    let (timer, _) = FakeTimer::new();
    let mut controller = ConnectController::new(
        Config::default(),
        Box::new(store.clone()),
        Box::new(server),
        Box::new(host),
        Box::new(timer),
    )
    .unwrap();

    let copied = controller.copy_snippet().unwrap();
    assert_eq!(log.borrow().clipboard.as_deref(), Some(copied.as_str()));
    assert!(copied.contains(r#"src="https://example.com/custom.js""#));

    assert!(controller.reset().unwrap());
    let stored = store.load().unwrap();
    assert_eq!(stored, ConnectionSettings::default());
    assert_eq!(
        stored.script_endpoint,
        "https://asyntai.com/static/js/chat-widget.js"
    );
    assert_eq!(
        log.borrow().notices,
        vec!["Code copied to clipboard", "Settings reset successfully"]
    );
}

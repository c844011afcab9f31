//! Remote authorization and status-check endpoints

use serde::Deserialize;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::config::Config;
use crate::token::CorrelationToken;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Response does not invoke callback {0}")]
    CallbackMismatch(String),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Account data reported by the status endpoint once authorized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPayload {
    pub identifier: String,
    pub script_endpoint: Option<String>,
    pub account_label: Option<String>,
}

/// Result of a single status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCheck {
    /// Watchdog expired or the callback was never invoked
    NoResponse,
    /// Network or HTTP failure
    Failed(String),
    /// Not authorized yet, or the payload lacked an identifier
    Pending,
    Authorized(StatusPayload),
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    site_id: Option<String>,
    script_url: Option<String>,
    account_email: Option<String>,
}

const USER_AGENT: &str = "widget-connect/0.1";
const CALLBACK_PREFIX: &str = "widgetConnectCallback";

/// A remote endpoint that reports whether a token has been authorized
pub trait StatusEndpoint {
    fn check(&self, token: &CorrelationToken, callback: &str) -> StatusCheck;
}

/// Build the authorization URL opened in the external window
pub fn authorization_url(config: &Config, token: &CorrelationToken) -> String {
    format!(
        "{}?platform={}&state={}",
        config.auth_url,
        urlencoding::encode(&config.platform),
        urlencoding::encode(token.as_str())
    )
}

/// Build the status-check URL for one attempt
pub fn status_url(config: &Config, token: &CorrelationToken, callback: &str) -> String {
    format!(
        "{}?state={}&cb={}",
        config.status_url,
        urlencoding::encode(token.as_str()),
        urlencoding::encode(callback)
    )
}

/// A callback name unique to one attempt
pub fn callback_name(attempt: u32) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{CALLBACK_PREFIX}_{millis}_{attempt}")
}

/// Parse a JSONP body of the form `callback(<json>);`
///
/// Returns `Ok(None)` when the callback is invoked without a usable
/// identifier (no argument, `null`, `{}` or an empty `site_id`).
pub fn parse_status_body(body: &str, callback: &str) -> Result<Option<StatusPayload>, ApiError> {
    let body = body.trim();
    let body = body.strip_suffix(';').unwrap_or(body).trim_end();
    let args = body
        .strip_prefix(callback)
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| ApiError::CallbackMismatch(callback.to_string()))?
        .trim();

    if args.is_empty() || args == "null" || args == "undefined" {
        return Ok(None);
    }

    let resp: StatusResponse =
        serde_json::from_str(args).map_err(|e| ApiError::ParseError(e.to_string()))?;

    Ok(resp
        .site_id
        .filter(|id| !id.trim().is_empty())
        .map(|identifier| StatusPayload {
            identifier,
            script_endpoint: resp.script_url.filter(|s| !s.is_empty()),
            account_label: resp.account_email.filter(|s| !s.is_empty()),
        }))
}

/// Status endpoint reached over HTTP
pub struct HttpStatusEndpoint {
    agent: ureq::Agent,
    config: Config,
}

impl HttpStatusEndpoint {
    /// The agent timeout acts as the per-attempt watchdog
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.watchdog())
            .user_agent(USER_AGENT)
            .build();
        HttpStatusEndpoint {
            agent,
            config: config.clone(),
        }
    }
}

impl StatusEndpoint for HttpStatusEndpoint {
    fn check(&self, token: &CorrelationToken, callback: &str) -> StatusCheck {
        let url = status_url(&self.config, token, callback);
        let response = self.agent.get(&url).call();

        let body = match response {
            Ok(resp) => match resp.into_string() {
                Ok(body) => body,
                Err(e) if is_timeout_io(&e) => return StatusCheck::NoResponse,
                Err(e) => return StatusCheck::Failed(e.to_string()),
            },
            Err(ureq::Error::Transport(t)) if is_timeout_transport(&t) => {
                return StatusCheck::NoResponse
            }
            Err(e) => return StatusCheck::Failed(e.to_string()),
        };

        match parse_status_body(&body, callback) {
            Ok(Some(payload)) => StatusCheck::Authorized(payload),
            Ok(None) => StatusCheck::Pending,
            Err(ApiError::CallbackMismatch(_)) => StatusCheck::NoResponse,
            Err(e) => {
                log::debug!("Malformed status payload: {}", e);
                StatusCheck::Pending
            }
        }
    }
}

fn is_timeout_io(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn is_timeout_transport(t: &ureq::Transport) -> bool {
    use std::error::Error as _;
    t.source()
        .and_then(|s| s.downcast_ref::<io::Error>())
        .map_or(false, is_timeout_io)
}

//! Connection handshake state machine
//!
//! Pure transitions only: the caller performs the returned [`Next`] step
//! (wait, check, persist) and feeds the result back. Every resolution is
//! matched against the single outstanding operation, so a late or repeated
//! signal for an attempt that already resolved is ignored.

use std::time::Duration;
use thiserror::Error;

use crate::api::{callback_name, StatusCheck, StatusPayload};
use crate::config::Timing;
use crate::token::CorrelationToken;

pub const WAITING_MESSAGE: &str = "Waiting for authorization...";
pub const SAVING_MESSAGE: &str = "Connected! Saving...";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("A connection attempt is already in progress")]
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Waiting,
    Connected,
    TimedOut,
}

/// How a handshake ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Connected,
    TimedOut,
    PopupBlocked,
    Cancelled,
}

/// Identifies one attempt of one handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptTicket {
    pub token: CorrelationToken,
    pub attempt: u32,
    pub callback: String,
}

/// What the driver must do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Wait, then call [`Handshake::poll_due`]
    Schedule(Duration),
    /// Run a status check, then call [`Handshake::resolve_check`]
    Check(AttemptTicket),
    /// Persist, then call [`Handshake::resolve_persist`]
    Persist(AttemptTicket, StatusPayload),
    Finished(Outcome),
    /// The signal was stale or duplicate
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outstanding {
    Wait,
    Check(u32),
    Persist(u32),
}

#[derive(Debug, Clone)]
pub struct Handshake {
    timing: Timing,
    phase: Phase,
    token: Option<CorrelationToken>,
    attempt: u32,
    outstanding: Option<Outstanding>,
    status_message: String,
}

impl Handshake {
    pub fn new(timing: Timing) -> Self {
        Handshake {
            timing,
            phase: Phase::Idle,
            token: None,
            attempt: 0,
            outstanding: None,
            status_message: String::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn token(&self) -> Option<&CorrelationToken> {
        self.token.as_ref()
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase == Phase::Waiting
    }

    /// Replace the timing; refused while a handshake is in flight
    pub fn set_timing(&mut self, timing: Timing) -> Result<(), HandshakeError> {
        if self.is_in_flight() {
            return Err(HandshakeError::InFlight);
        }
        self.timing = timing;
        Ok(())
    }

    /// Start waiting on `token`; the first poll is due after `first_delay`
    pub fn begin(
        &mut self,
        token: CorrelationToken,
        first_delay: Duration,
    ) -> Result<Next, HandshakeError> {
        if self.is_in_flight() {
            return Err(HandshakeError::InFlight);
        }
        log::info!("Handshake started for {}", token);
        self.phase = Phase::Waiting;
        self.token = Some(token);
        self.attempt = 0;
        self.outstanding = Some(Outstanding::Wait);
        self.status_message = WAITING_MESSAGE.to_string();
        Ok(Next::Schedule(first_delay))
    }

    /// Return to idle (popup blocked or cancelled). Returns false if idle already.
    pub fn abort(&mut self) -> bool {
        if !self.is_in_flight() {
            return false;
        }
        log::info!("Handshake aborted after {} attempts", self.attempt);
        self.phase = Phase::Idle;
        self.token = None;
        self.outstanding = None;
        self.status_message.clear();
        true
    }

    /// A scheduled wait elapsed
    pub fn poll_due(&mut self) -> Next {
        if self.phase != Phase::Waiting || self.outstanding != Some(Outstanding::Wait) {
            return Next::Ignore;
        }
        let Some(token) = self.token.clone() else {
            return Next::Ignore;
        };

        self.attempt += 1;
        if self.attempt > self.timing.max_attempts {
            log::error!(
                "Connection timeout after {} attempts",
                self.timing.max_attempts
            );
            self.phase = Phase::TimedOut;
            self.outstanding = None;
            self.status_message.clear();
            return Next::Finished(Outcome::TimedOut);
        }

        self.outstanding = Some(Outstanding::Check(self.attempt));
        Next::Check(AttemptTicket {
            token,
            attempt: self.attempt,
            callback: callback_name(self.attempt),
        })
    }

    /// The status check for `ticket` completed
    pub fn resolve_check(&mut self, ticket: &AttemptTicket, check: StatusCheck) -> Next {
        if !self.owns(ticket, Outstanding::Check(ticket.attempt)) {
            log::debug!("Ignoring stale check result for attempt {}", ticket.attempt);
            return Next::Ignore;
        }

        match check {
            StatusCheck::Authorized(payload) => {
                self.outstanding = Some(Outstanding::Persist(ticket.attempt));
                self.status_message = SAVING_MESSAGE.to_string();
                Next::Persist(ticket.clone(), payload)
            }
            StatusCheck::Pending => {
                log::debug!("Attempt {}: not authorized yet", ticket.attempt);
                self.schedule(self.timing.retry)
            }
            StatusCheck::NoResponse => {
                log::debug!("Attempt {}: no response", ticket.attempt);
                self.schedule(self.timing.error_retry)
            }
            StatusCheck::Failed(reason) => {
                log::debug!("Attempt {}: check failed: {}", ticket.attempt, reason);
                self.schedule(self.timing.error_retry)
            }
        }
    }

    /// Persisting the payload from `ticket` completed
    pub fn resolve_persist(&mut self, ticket: &AttemptTicket, saved: bool) -> Next {
        if !self.owns(ticket, Outstanding::Persist(ticket.attempt)) {
            log::debug!("Ignoring stale save result for attempt {}", ticket.attempt);
            return Next::Ignore;
        }

        if saved {
            log::info!("Connected after {} attempts", ticket.attempt);
            self.phase = Phase::Connected;
            self.outstanding = None;
            self.status_message.clear();
            Next::Finished(Outcome::Connected)
        } else {
            log::warn!("Save failed on attempt {}, will retry", ticket.attempt);
            self.status_message.clear();
            self.schedule(self.timing.retry)
        }
    }

    fn owns(&self, ticket: &AttemptTicket, expected: Outstanding) -> bool {
        self.phase == Phase::Waiting
            && self.token.as_ref() == Some(&ticket.token)
            && self.outstanding == Some(expected)
    }

    fn schedule(&mut self, delay: Duration) -> Next {
        self.outstanding = Some(Outstanding::Wait);
        Next::Schedule(delay)
    }
}

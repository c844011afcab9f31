//! Core library for the chat widget connection plugin
//!
//! This library connects a site to a third-party chat-widget account: it
//! runs the popup authorization handshake, persists the resulting account
//! settings and renders the embeddable script snippet. The host shell is
//! reached through the [`host::Host`] trait, or through the C FFI in [`ffi`].

pub mod api;
pub mod config;
pub mod controller;
pub mod ffi;
pub mod handshake;
pub mod host;
pub mod monitor;
pub mod settings;
pub mod token;

pub use controller::{CancelHandle, ConnectController, ConnectError};
pub use handshake::{Outcome, Phase};
pub use settings::{ConnectionSettings, SettingsStore};

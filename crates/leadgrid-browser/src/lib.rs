//! Browser automation for the primary collector.
//!
//! Every launch produces a fresh, isolated browser session with a rotated
//! fingerprint and an automation-masking init script. Pages are driven
//! through the [`BrowserActions`] trait so the collector can be tested
//! against scripted pages.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod stealth;

pub use actions::{
    extract_domain, BrowserActions, BrowserLauncher, BrowserSession, ClickTarget, SessionCookie,
};
pub use engine::{BrowserEngine, ChromiumLauncher, EnginePage, LaunchSettings};
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;

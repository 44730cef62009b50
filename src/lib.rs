//! Chaser-Capture: CDP page driver with per-action state capture
//!
//! Drives a Chromium-based browser over the DevTools protocol and, after
//! each interaction, archives the page's HTML, a markdown rendering, a
//! screenshot and the console output under a numbered session directory.

pub mod error;
pub mod config;

pub mod cdp;
pub mod targets;
pub mod capture;
pub mod actions;

// Re-exports
pub use error::{Error, ErrorKind, Result};

/// Chaser-Capture library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

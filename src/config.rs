//! Configuration management for Chaser-Capture

use crate::cdp::CdpTimeoutConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host of the browser's remote-debugging interface
    pub cdp_host: String,

    /// Port of the browser's remote-debugging interface
    pub cdp_port: u16,

    /// Parent directory for capture session roots
    pub capture_dir: Option<PathBuf>,

    /// Default timeout for protocol commands in milliseconds
    pub command_timeout_ms: u64,

    /// Timeout for navigation commands and load waits in milliseconds
    pub navigation_timeout_ms: u64,

    /// Timeout for screenshot commands in milliseconds
    pub screenshot_timeout_ms: u64,

    /// Wait engine polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Maximum console messages buffered per target
    pub console_buffer_limit: usize,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cdp_host: "127.0.0.1".to_string(),
            cdp_port: 9222,
            capture_dir: None,
            command_timeout_ms: 30000,
            navigation_timeout_ms: 30000,
            screenshot_timeout_ms: 90000,
            poll_interval_ms: 100,
            console_buffer_limit: 1000,
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::configuration(format!("Invalid {}", name)))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(host) = env::var("CDP_HOST") {
            config.cdp_host = host;
        }

        if let Ok(port) = env::var("CDP_PORT") {
            config.cdp_port = parse_var("CDP_PORT", &port)?;
        }

        if let Ok(dir) = env::var("CHASER_CAPTURE_DIR") {
            config.capture_dir = Some(PathBuf::from(dir));
        }

        if let Ok(timeout) = env::var("CHASER_COMMAND_TIMEOUT") {
            config.command_timeout_ms = parse_var("CHASER_COMMAND_TIMEOUT", &timeout)?;
        }

        if let Ok(timeout) = env::var("CHASER_NAVIGATION_TIMEOUT") {
            config.navigation_timeout_ms = parse_var("CHASER_NAVIGATION_TIMEOUT", &timeout)?;
        }

        if let Ok(timeout) = env::var("CHASER_SCREENSHOT_TIMEOUT") {
            config.screenshot_timeout_ms = parse_var("CHASER_SCREENSHOT_TIMEOUT", &timeout)?;
        }

        if let Ok(interval) = env::var("CHASER_POLL_INTERVAL") {
            config.poll_interval_ms = parse_var("CHASER_POLL_INTERVAL", &interval)?;
        }

        if let Ok(limit) = env::var("CHASER_CONSOLE_LIMIT") {
            config.console_buffer_limit = parse_var("CHASER_CONSOLE_LIMIT", &limit)?;
        }

        if let Ok(log_level) = env::var("CHASER_LOG_LEVEL") {
            config.log_level = log_level;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Base URL of the discovery HTTP interface
    pub fn http_endpoint(&self) -> String {
        format!("http://{}:{}", self.cdp_host, self.cdp_port)
    }

    /// Directory under which session roots are created
    pub fn capture_base_dir(&self) -> PathBuf {
        self.capture_dir.clone().unwrap_or_else(env::temp_dir)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-method command deadlines for the transport
    pub fn timeouts(&self) -> CdpTimeoutConfig {
        CdpTimeoutConfig {
            default_timeout: Duration::from_millis(self.command_timeout_ms),
            screenshot_timeout: Duration::from_millis(self.screenshot_timeout_ms),
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            execution_timeout: Duration::from_millis(self.command_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_local_browser() {
        let config = Config::default();
        assert_eq!(config.http_endpoint(), "http://127.0.0.1:9222");
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("cdp_host = \"10.0.0.5\"\ncdp_port = 9333\n").unwrap();
        assert_eq!(config.http_endpoint(), "http://10.0.0.5:9333");
        assert_eq!(config.console_buffer_limit, 1000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_timeout_table() {
        let config = Config {
            command_timeout_ms: 5000,
            screenshot_timeout_ms: 7000,
            ..Config::default()
        };
        let timeouts = config.timeouts();
        assert_eq!(timeouts.for_method("Runtime.evaluate"), Duration::from_millis(5000));
        assert_eq!(timeouts.for_method("Page.captureScreenshot"), Duration::from_millis(7000));
    }
}

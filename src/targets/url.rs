//! WebSocket URL rewriting
//!
//! Discovery reports debugger URLs from the browser's point of view, which
//! is wrong when the browser runs remotely or in a container. Every URL is
//! pointed at the configured host and port before it is dialed.

use reqwest::Url;

/// Replace host and port of `url`. Absent URLs stay absent; strings that
/// do not parse, or cannot carry a host, come back unchanged.
pub fn rewrite_ws_url(url: Option<&str>, host: &str, port: u16) -> Option<String> {
    let raw = url?;

    let mut parsed = match Url::parse(raw) {
        Ok(parsed) => parsed,
        Err(_) => return Some(raw.to_string()),
    };

    if parsed.set_host(Some(host)).is_err() || parsed.set_port(Some(port)).is_err() {
        return Some(raw.to_string());
    }

    Some(parsed.to_string())
}

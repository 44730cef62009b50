//! Per-target event routing
//!
//! An [`EventRouter`] owns the single event subscription of a target. It
//! enables the Page and Runtime domains, keeps an ordered, bounded console
//! log and satisfies one-shot load waiters. Events are processed by one task
//! in the order the connection delivered them.

use super::traits::{CdpConnection, CdpEvent};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One console event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleMessage {
    /// Console API type (log, info, warning, error, debug, ...)
    pub level: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConsoleMessage {
    pub fn new<L: Into<String>, T: Into<String>>(level: L, text: T) -> Self {
        Self {
            level: level.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build from `Runtime.consoleAPICalled` params
    fn from_console_api(params: &Value) -> Self {
        let level = params
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("log")
            .to_string();

        let text = params
            .get("args")
            .and_then(Value::as_array)
            .map(|args| args.iter().map(remote_arg_text).collect::<Vec<_>>().join(" "))
            .unwrap_or_default();

        Self {
            level,
            text,
            timestamp: event_timestamp(params),
        }
    }

    /// Build from `Runtime.exceptionThrown` params
    fn from_exception(params: &Value) -> Self {
        let details = params.get("exceptionDetails");
        let text = details
            .and_then(|d| d.get("exception"))
            .and_then(|e| e.get("description"))
            .and_then(Value::as_str)
            .or_else(|| details.and_then(|d| d.get("text")).and_then(Value::as_str))
            .unwrap_or("Uncaught exception")
            .to_string();

        Self {
            level: "error".to_string(),
            text,
            timestamp: event_timestamp(params),
        }
    }

    /// `[2024-01-01T12:00:00.000Z] [log] text`
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            self.level,
            self.text
        )
    }
}

fn remote_arg_text(arg: &Value) -> String {
    match arg.get("value") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => arg
            .get("description")
            .or_else(|| arg.get("unserializableValue"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                arg.get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("undefined")
                    .to_string()
            }),
        Some(other) => other.to_string(),
    }
}

/// CDP timestamps are epoch milliseconds as floats
fn event_timestamp(params: &Value) -> DateTime<Utc> {
    params
        .get("timestamp")
        .and_then(Value::as_f64)
        .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms as i64))
        .unwrap_or_else(Utc::now)
}

/// Ordered console buffer with a drain cursor
#[derive(Debug)]
pub struct ConsoleLog {
    entries: VecDeque<ConsoleMessage>,
    /// Leading entries already handed out by a drain
    drained: usize,
    capacity: usize,
    dropped: u64,
}

impl ConsoleLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            drained: 0,
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, message: ConsoleMessage) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.drained = self.drained.saturating_sub(1);
            self.dropped += 1;
        }
        self.entries.push_back(message);
    }

    /// Messages appended since the previous drain. With `clear`, everything
    /// up to now is also removed from the buffer.
    pub fn drain(&mut self, clear: bool) -> Vec<ConsoleMessage> {
        let fresh: Vec<ConsoleMessage> = self.entries.iter().skip(self.drained).cloned().collect();
        if clear {
            self.entries.clear();
            self.drained = 0;
        } else {
            self.drained = self.entries.len();
        }
        fresh
    }

    pub fn snapshot(&self) -> Vec<ConsoleMessage> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.drained = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages evicted because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

type LoadWaiters = Arc<Mutex<Vec<oneshot::Sender<()>>>>;

/// Single-shot waiter for the next `Page.loadEventFired`
#[derive(Debug)]
pub struct LoadWaiter {
    receiver: oneshot::Receiver<()>,
}

impl LoadWaiter {
    /// Block until the load event or `timeout`, whichever comes first
    pub async fn wait(self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::connection("Event stream ended before page load")),
            Err(_) => Err(Error::timeout_after("Waiting for page load", started.elapsed())),
        }
    }
}

/// Page/Runtime notification router for one target
#[derive(Debug)]
pub struct EventRouter {
    console: Arc<Mutex<ConsoleLog>>,
    load_waiters: LoadWaiters,
    pump: JoinHandle<()>,
}

impl EventRouter {
    /// Subscribe to the connection's events, then enable the Page and
    /// Runtime domains. Subscribing first keeps the console messages the
    /// browser replays on `Runtime.enable`.
    pub async fn attach(connection: &Arc<dyn CdpConnection>, console_capacity: usize) -> Result<Self> {
        let events = connection.listen_events().await?;
        let router = Self::from_receiver(events, console_capacity);

        connection.send_command("Page.enable", serde_json::json!({})).await?;
        connection.send_command("Runtime.enable", serde_json::json!({})).await?;
        info!("Page and Runtime domains enabled");

        Ok(router)
    }

    /// Start routing events from an existing subscription
    pub fn from_receiver(events: mpsc::UnboundedReceiver<CdpEvent>, console_capacity: usize) -> Self {
        let console = Arc::new(Mutex::new(ConsoleLog::new(console_capacity)));
        let load_waiters: LoadWaiters = Arc::new(Mutex::new(Vec::new()));

        let pump = tokio::spawn(Self::pump(events, Arc::clone(&console), Arc::clone(&load_waiters)));

        Self {
            console,
            load_waiters,
            pump,
        }
    }

    async fn pump(mut events: mpsc::UnboundedReceiver<CdpEvent>, console: Arc<Mutex<ConsoleLog>>, load_waiters: LoadWaiters) {
        while let Some(event) = events.recv().await {
            match event.method.as_str() {
                "Runtime.consoleAPICalled" => {
                    Self::record(&console, ConsoleMessage::from_console_api(&event.params)).await;
                }
                "Runtime.exceptionThrown" => {
                    Self::record(&console, ConsoleMessage::from_exception(&event.params)).await;
                }
                "Page.loadEventFired" => {
                    let waiters: Vec<_> = load_waiters.lock().await.drain(..).collect();
                    debug!("Load event fired, releasing {} waiters", waiters.len());
                    for waiter in waiters {
                        let _ = waiter.send(());
                    }
                }
                _ => {}
            }
        }
        debug!("Event stream ended");
    }

    async fn record(console: &Mutex<ConsoleLog>, message: ConsoleMessage) {
        let mut log = console.lock().await;
        let dropped_before = log.dropped();
        log.push(message);
        if log.dropped() > dropped_before && log.dropped() % 100 == 1 {
            warn!("Console buffer full, {} messages dropped so far", log.dropped());
        }
    }

    /// Register a waiter for the next load event. Register before issuing
    /// the navigation so a fast load cannot be missed.
    pub async fn load_waiter(&self) -> LoadWaiter {
        let (sender, receiver) = oneshot::channel();
        self.load_waiters.lock().await.push(sender);
        LoadWaiter { receiver }
    }

    /// Messages since the last drain, optionally clearing the buffer
    pub async fn drain_console(&self, clear: bool) -> Vec<ConsoleMessage> {
        self.console.lock().await.drain(clear)
    }

    /// Every buffered message, without moving the drain cursor
    pub async fn console_messages(&self) -> Vec<ConsoleMessage> {
        self.console.lock().await.snapshot()
    }

    pub async fn clear_console(&self) {
        self.console.lock().await.clear();
    }
}

impl Drop for EventRouter {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockCdpConnection;
    use crate::ErrorKind;

    fn console_event(level: &str, text: &str) -> (String, Value) {
        (
            "Runtime.consoleAPICalled".to_string(),
            serde_json::json!({
                "type": level,
                "args": [{ "type": "string", "value": text }],
                "timestamp": 1700000000000.0
            }),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn test_console_log_drain_cursor() {
        let mut log = ConsoleLog::new(10);
        log.push(ConsoleMessage::new("log", "one"));
        log.push(ConsoleMessage::new("log", "two"));

        let first: Vec<_> = log.drain(false).into_iter().map(|m| m.text).collect();
        assert_eq!(first, vec!["one", "two"]);
        assert!(log.drain(false).is_empty());
        assert_eq!(log.len(), 2);

        log.push(ConsoleMessage::new("warning", "three"));
        let second: Vec<_> = log.drain(true).into_iter().map(|m| m.text).collect();
        assert_eq!(second, vec!["three"]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_console_log_is_bounded() {
        let mut log = ConsoleLog::new(3);
        for i in 0..5 {
            log.push(ConsoleMessage::new("log", i.to_string()));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.dropped(), 2);
        let texts: Vec<_> = log.drain(false).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_console_args_formatting() {
        let message = ConsoleMessage::from_console_api(&serde_json::json!({
            "type": "log",
            "args": [
                { "type": "string", "value": "count" },
                { "type": "number", "value": 3 },
                { "type": "object", "description": "Object" },
                { "type": "undefined" }
            ]
        }));
        assert_eq!(message.text, "count 3 Object undefined");
        assert!(message.format_line().contains("[log] count 3"));
    }

    #[test]
    fn test_console_message_serializes_timestamp() {
        let message = ConsoleMessage::from_console_api(&serde_json::json!({
            "type": "error",
            "args": [{ "type": "string", "value": "boom" }],
            "timestamp": 1_700_000_000_000.0_f64
        }));

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["text"], "boom");
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20Z");
    }

    #[tokio::test]
    async fn test_attach_enables_domains() {
        let mock = Arc::new(MockCdpConnection::new());
        let connection: Arc<dyn CdpConnection> = mock.clone();

        let _router = EventRouter::attach(&connection, 10).await.unwrap();

        assert_eq!(mock.methods(), vec!["Page.enable", "Runtime.enable"]);
    }

    #[tokio::test]
    async fn test_console_messages_keep_wire_order() {
        let mock = Arc::new(MockCdpConnection::new());
        let connection: Arc<dyn CdpConnection> = mock.clone();
        let router = EventRouter::attach(&connection, 10).await.unwrap();

        for (level, text) in [("log", "a"), ("error", "b"), ("info", "c")] {
            let (method, params) = console_event(level, text);
            mock.emit(&method, params);
        }
        mock.emit(
            "Runtime.exceptionThrown",
            serde_json::json!({ "exceptionDetails": { "text": "Uncaught", "exception": { "description": "TypeError: x" } } }),
        );
        settle().await;

        let drained = router.drain_console(false).await;
        let texts: Vec<_> = drained.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "TypeError: x"]);
        assert_eq!(drained[3].level, "error");

        assert!(router.drain_console(false).await.is_empty());
        assert_eq!(router.console_messages().await.len(), 4);

        router.clear_console().await;
        assert!(router.console_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_waiter_is_single_shot() {
        let mock = Arc::new(MockCdpConnection::new());
        let connection: Arc<dyn CdpConnection> = mock.clone();
        let router = EventRouter::attach(&connection, 10).await.unwrap();

        let waiter = router.load_waiter().await;
        mock.emit("Page.loadEventFired", serde_json::json!({ "timestamp": 1.0 }));
        waiter.wait(Duration::from_secs(1)).await.unwrap();

        // Already-fired event does not satisfy a later waiter
        let late = router.load_waiter().await;
        let err = late.wait(Duration::from_millis(30)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}

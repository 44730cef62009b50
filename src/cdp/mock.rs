//! Mock CDP implementation for testing
//!
//! [`MockCdpConnection`] answers commands through a replaceable handler,
//! records every call and lets tests inject events as if they came off the
//! wire.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::cdp::traits::*;
use crate::Error;

/// Command handler: method and params in, result payload out
pub type MockHandler = Arc<dyn Fn(&str, &Value) -> Result<Value, Error> + Send + Sync>;

/// A 1x1 transparent PNG, base64-encoded
pub const MOCK_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

/// Mock CDP connection
pub struct MockCdpConnection {
    handler: MockHandler,
    calls: Mutex<Vec<(String, Value)>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CdpEvent>>>,
    is_active: AtomicBool,
    next_id: AtomicU64,
}

impl fmt::Debug for MockCdpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCdpConnection")
            .field("is_active", &self.is_active.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MockCdpConnection {
    /// Mock with canned responses for the common Page/Runtime methods
    pub fn new() -> Self {
        Self::with_handler(Self::default_response)
    }

    /// Mock answering every command through `handler`
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            calls: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            is_active: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// Responses used by [`MockCdpConnection::new`]
    pub fn default_response(method: &str, _params: &Value) -> Result<Value, Error> {
        Ok(match method {
            "Page.navigate" => json!({
                "frameId": uuid::Uuid::new_v4().to_string(),
                "loaderId": uuid::Uuid::new_v4().to_string(),
            }),
            "Runtime.evaluate" => Self::evaluate_result(json!("mock result")),
            "Page.captureScreenshot" => json!({ "data": MOCK_PNG_BASE64 }),
            _ => json!({}),
        })
    }

    /// Wrap a JSON value as a by-value `Runtime.evaluate` result
    pub fn evaluate_result(value: Value) -> Value {
        let r#type = match &value {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Null => "undefined",
            Value::Array(_) | Value::Object(_) => "object",
        };
        json!({ "result": { "type": r#type, "value": value } })
    }

    /// A `Runtime.evaluate` result whose script threw
    pub fn evaluate_exception(description: &str) -> Value {
        json!({
            "result": { "type": "object", "subtype": "error", "description": description },
            "exceptionDetails": {
                "exceptionId": 1,
                "text": "Uncaught",
                "lineNumber": 0,
                "columnNumber": 0,
                "exception": { "type": "object", "subtype": "error", "description": description }
            }
        })
    }

    /// Deliver an event to every subscriber
    pub fn emit(&self, method: &str, params: Value) {
        let event = CdpEvent {
            method: method.to_string(),
            params,
            session_id: None,
        };
        self.subscribers
            .lock()
            .unwrap()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Every command received so far
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Methods of every command received so far
    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(method, _)| method).collect()
    }

    /// Expressions of every `Runtime.evaluate` received so far
    pub fn evaluated(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(method, _)| method == "Runtime.evaluate")
            .filter_map(|(_, params)| params["expression"].as_str().map(str::to_string))
            .collect()
    }
}

impl Default for MockCdpConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdpConnection for MockCdpConnection {
    async fn send_command(&self, method: &str, params: Value) -> Result<CdpResponse, Error> {
        if !self.is_active.load(Ordering::Relaxed) {
            return Err(Error::connection("Connection is closed"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.calls.lock().unwrap().push((method.to_string(), params.clone()));

        let result = (self.handler)(method, &params)?;

        Ok(CdpResponse {
            id,
            result: Some(result),
            error: None,
        })
    }

    async fn listen_events(&self) -> Result<mpsc::UnboundedReceiver<CdpEvent>, Error> {
        if !self.is_active.load(Ordering::Relaxed) {
            return Err(Error::connection("Connection is closed"));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(sender);
        Ok(receiver)
    }

    async fn close(&self) -> Result<(), Error> {
        self.is_active.store(false, Ordering::Relaxed);
        self.subscribers.lock().unwrap().clear();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Relaxed)
    }
}

//! CDP client implementation
//!
//! This module provides a typed client with methods for the Page and
//! Runtime operations the capture pipeline needs.

use super::traits::CdpConnection;
use super::types::*;
use crate::Error;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// JavaScript evaluation result
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult {
    /// String value
    String(String),
    /// Number value
    Number(f64),
    /// Boolean value
    Bool(bool),
    /// Null or undefined
    Null,
    /// Object/Array (as JSON)
    Object(Value),
}

impl EvaluationResult {
    /// JSON form of the result
    pub fn into_value(self) -> Value {
        match self {
            EvaluationResult::String(s) => Value::String(s),
            EvaluationResult::Number(n) => json!(n),
            EvaluationResult::Bool(b) => Value::Bool(b),
            EvaluationResult::Null => Value::Null,
            EvaluationResult::Object(v) => v,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EvaluationResult::String(s) => Some(s),
            _ => None,
        }
    }

    /// JavaScript truthiness of the result
    pub fn is_truthy(&self) -> bool {
        match self {
            EvaluationResult::String(s) => !s.is_empty(),
            EvaluationResult::Number(n) => *n != 0.0 && !n.is_nan(),
            EvaluationResult::Bool(b) => *b,
            EvaluationResult::Null => false,
            EvaluationResult::Object(_) => true,
        }
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationResult::String(s) => f.write_str(s),
            EvaluationResult::Number(n) => write!(f, "{}", n),
            EvaluationResult::Bool(b) => write!(f, "{}", b),
            EvaluationResult::Null => f.write_str("undefined"),
            EvaluationResult::Object(v) => write!(f, "{}", v),
        }
    }
}

/// CDP client bound to one target connection
#[derive(Debug, Clone)]
pub struct CdpClient {
    /// Underlying CDP connection
    connection: Arc<dyn CdpConnection>,
}

impl CdpClient {
    /// Create a new CDP client
    pub fn new(connection: Arc<dyn CdpConnection>) -> Self {
        Self { connection }
    }

    /// Get the underlying connection
    pub fn connection(&self) -> Arc<dyn CdpConnection> {
        Arc::clone(&self.connection)
    }

    /// Parse remote object value to evaluation result
    fn parse_remote_object(obj: &RemoteObject) -> EvaluationResult {
        match obj.r#type.as_str() {
            "string" => EvaluationResult::String(
                obj.value.as_ref().and_then(|v| v.as_str()).unwrap_or("").to_string(),
            ),
            "number" => match obj.value.as_ref().and_then(|v| v.as_f64()) {
                Some(n) => EvaluationResult::Number(n),
                // NaN, Infinity, -0 only arrive as unserializableValue
                None => match obj.unserializable_value.as_deref() {
                    Some("Infinity") => EvaluationResult::Number(f64::INFINITY),
                    Some("-Infinity") => EvaluationResult::Number(f64::NEG_INFINITY),
                    Some("-0") => EvaluationResult::Number(-0.0),
                    _ => EvaluationResult::Number(f64::NAN),
                },
            },
            "boolean" => EvaluationResult::Bool(obj.value.as_ref().and_then(|v| v.as_bool()).unwrap_or(false)),
            "undefined" => EvaluationResult::Null,
            "object" | "function" | "bigint" | "symbol" => match &obj.value {
                Some(Value::Null) if obj.subtype.as_deref() == Some("null") => EvaluationResult::Null,
                Some(value) => EvaluationResult::Object(value.clone()),
                None => match &obj.description {
                    Some(description) => EvaluationResult::String(description.clone()),
                    None => EvaluationResult::Null,
                },
            },
            other => {
                debug!("parse_remote_object: unknown type '{}', returning Null", other);
                EvaluationResult::Null
            }
        }
    }

    /// Call a raw CDP method
    pub async fn call_method(&self, method: &str, params: Value) -> Result<Value, Error> {
        let response = self.connection.send_command(method, params).await?;
        response.result.ok_or_else(|| Error::cdp(format!("No result in {} response", method)))
    }

    /// Evaluate JavaScript in the page. A thrown exception becomes
    /// [`Error::Evaluation`].
    pub async fn evaluate(&self, script: &str, await_promise: bool) -> Result<EvaluationResult, Error> {
        debug!("Evaluating script ({} bytes)", script.len());

        let params = EvaluateParams {
            expression: script.to_string(),
            await_promise: Some(await_promise),
            return_by_value: Some(true),
        };

        let result = self.call_method("Runtime.evaluate", serde_json::to_value(params)?).await?;
        let response: EvaluateResponse = serde_json::from_value(result)?;

        if let Some(exception) = response.exception_details {
            return Err(Error::evaluation(exception.message()));
        }

        Ok(Self::parse_remote_object(&response.result))
    }

    /// Evaluate a script expected to produce a string
    pub async fn evaluate_string(&self, script: &str) -> Result<String, Error> {
        match self.evaluate(script, false).await? {
            EvaluationResult::String(s) => Ok(s),
            other => Err(Error::evaluation(format!("Expected a string result, got {}", other))),
        }
    }

    /// Issue `Page.navigate`. Does not wait for the load event.
    pub async fn navigate(&self, url: &str) -> Result<Value, Error> {
        info!("Navigating to {}", url);

        let result = self.call_method("Page.navigate", json!({ "url": url })).await?;

        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            return Err(Error::navigation(format!("{}: {}", url, error_text)));
        }

        Ok(result)
    }

    /// Capture a PNG screenshot of the viewport
    pub async fn screenshot(&self) -> Result<Vec<u8>, Error> {
        debug!("Capturing screenshot");

        let result = self.call_method("Page.captureScreenshot", json!({ "format": "png" })).await?;

        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::cdp("No data in screenshot result"))?;

        BASE64
            .decode(data)
            .map_err(|e| Error::cdp(format!("Failed to decode screenshot: {}", e)))
    }

    /// Dispatch a full Enter keypress to the focused element
    pub async fn press_enter(&self) -> Result<(), Error> {
        let key = json!({
            "key": "Enter",
            "code": "Enter",
            "windowsVirtualKeyCode": 13,
            "nativeVirtualKeyCode": 13,
        });

        let mut down = key.clone();
        down["type"] = json!("keyDown");
        down["text"] = json!("\r");
        self.call_method("Input.dispatchKeyEvent", down).await?;

        let mut up = key;
        up["type"] = json!("keyUp");
        self.call_method("Input.dispatchKeyEvent", up).await?;

        Ok(())
    }
}

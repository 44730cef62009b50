//! Action results

use crate::capture::CaptureRecord;
use crate::cdp::EvaluationResult;
use std::fmt;

/// Where a navigation ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    pub url: String,
    /// False when no load event arrived before the deadline
    pub loaded: bool,
}

/// What the primitive itself produced
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Message(String),
    Value(EvaluationResult),
    Navigation(NavigationOutcome),
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionResult::Message(message) => f.write_str(message),
            ActionResult::Value(value) => write!(f, "Result: {}", value),
            ActionResult::Navigation(nav) if nav.loaded => write!(f, "Navigated to {}", nav.url),
            ActionResult::Navigation(nav) => {
                write!(f, "Navigated to {} (load event not seen before deadline)", nav.url)
            }
        }
    }
}

/// Primitive result plus the capture taken after it, if any
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action: String,
    pub result: ActionResult,
    pub capture: Option<CaptureRecord>,
}

impl ActionOutcome {
    pub fn new<S: Into<String>>(action: S, result: ActionResult) -> Self {
        Self {
            action: action.into(),
            result,
            capture: None,
        }
    }

    pub fn with_capture(mut self, record: CaptureRecord) -> Self {
        self.capture = Some(record);
        self
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.result)?;
        if let Some(capture) = &self.capture {
            write!(f, "{}", capture)?;
        }
        Ok(())
    }
}

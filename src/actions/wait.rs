//! Timed polling predicates
//!
//! A wait runs its check, sleeps for the poll interval and tries again
//! until the check holds or the deadline passes. Each check is bounded by
//! the time left, so a wait never outlives its deadline. Dropping a check
//! mid-flight leaves its protocol command to the correlator's own deadline.

use super::selector::Selector;
use crate::targets::Page;
use crate::{Error, ErrorKind, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound on the lone check of a zero-timeout wait
pub const SINGLE_CHECK_BUDGET: Duration = Duration::from_secs(1);

/// Script that is true once `text` appears in the page's rendered text
fn text_present_script(text: &str) -> String {
    format!(
        "(() => !!document.body && document.body.innerText.includes({}))()",
        serde_json::Value::String(text.to_string())
    )
}

#[derive(Debug, Clone)]
pub struct WaitEngine {
    poll_interval: Duration,
}

impl WaitEngine {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until `selector` matches an element. Returns the time waited.
    pub async fn wait_for_element(&self, page: &Page, selector: &str, timeout_ms: u64) -> Result<Duration> {
        let selector = Selector::parse(selector)?;
        let script = selector.exists_script();
        let script = script.as_str();
        let client = page.client();

        self.poll(&format!("element {}", selector), timeout_ms, move || async move {
            Ok::<_, Error>(client.evaluate(script, false).await?.is_truthy())
        })
        .await
    }

    /// Wait until `text` is part of the page's visible text
    pub async fn wait_for_text(&self, page: &Page, text: &str, timeout_ms: u64) -> Result<Duration> {
        let script = text_present_script(text);
        let script = script.as_str();
        let client = page.client();

        self.poll(&format!("text {:?}", text), timeout_ms, move || async move {
            Ok::<_, Error>(client.evaluate(script, false).await?.is_truthy())
        })
        .await
    }

    /// Generic retry loop. `timeout_ms == 0` runs the check exactly once,
    /// bounded by [`SINGLE_CHECK_BUDGET`].
    ///
    /// Evaluation and protocol errors from a check count as "not yet", the
    /// page may be between documents. Connection errors end the wait.
    pub async fn poll<F, Fut>(&self, description: &str, timeout_ms: u64, mut check: F) -> Result<Duration>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(timeout_ms);
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let budget = if timeout_ms == 0 {
                SINGLE_CHECK_BUDGET
            } else {
                deadline.saturating_duration_since(Instant::now())
            };
            let outcome = match tokio::time::timeout(budget, check()).await {
                Ok(outcome) => outcome,
                Err(_) => break,
            };

            match outcome {
                Ok(true) => {
                    debug!("Wait for {} satisfied after {} checks", description, attempts);
                    return Ok(started.elapsed());
                }
                Ok(false) => {}
                Err(e) if e.kind() == ErrorKind::Connection => return Err(e),
                Err(e) => debug!("Wait check for {} failed: {}", description, e),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }

        Err(Error::timeout_after(
            format!("Timed out after {}ms waiting for {}", timeout_ms, description),
            started.elapsed(),
        ))
    }
}

impl Default for WaitEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

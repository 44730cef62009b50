//! Page interaction primitives
//!
//! Each primitive works on an attached [`Page`]. The `*_with_capture`
//! variants run the primitive first and only then snapshot the page, so a
//! failed primitive never produces a capture and a failed capture never
//! fails the primitive.

use super::outcome::{ActionOutcome, ActionResult, NavigationOutcome};
use super::selector::{ElementReply, Selector};
use crate::capture::CaptureArtifactWriter;
use crate::cdp::EvaluationResult;
use crate::targets::Page;
use crate::{Error, ErrorKind, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Default wait for the load event after a navigation
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Split off one trailing newline, which requests a submit keypress
fn split_submit(text: &str) -> (&str, bool) {
    match text.strip_suffix('\n') {
        Some(rest) => (rest.strip_suffix('\r').unwrap_or(rest), true),
        None => (text, false),
    }
}

#[derive(Debug, Clone)]
pub struct ActionExecutor {
    writer: CaptureArtifactWriter,
    navigation_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(writer: CaptureArtifactWriter) -> Self {
        Self {
            writer,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
        }
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn writer(&self) -> &CaptureArtifactWriter {
        &self.writer
    }

    /// Navigate and wait for the load event. A load that does not finish in
    /// time is reported through [`NavigationOutcome::loaded`].
    pub async fn navigate(&self, page: &Page, url: &str) -> Result<NavigationOutcome> {
        // registered first so a fast load is not missed
        let waiter = page.events().load_waiter().await;
        page.client().navigate(url).await?;

        let loaded = match waiter.wait(self.navigation_timeout).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::Timeout => {
                warn!("No load event for {} within {:?}", url, self.navigation_timeout);
                false
            }
            Err(e) => return Err(e),
        };

        Ok(NavigationOutcome {
            url: url.to_string(),
            loaded,
        })
    }

    pub async fn click(&self, page: &Page, selector: &str) -> Result<String> {
        let selector = Selector::parse(selector)?;
        let result = page.client().evaluate(&selector.click_script(), false).await?;
        ElementReply::from_result(&selector, result)?;

        info!("Clicked {}", selector);
        Ok(format!("Clicked {}", selector))
    }

    /// Set the element's value. A trailing newline is stripped and sent as
    /// an Enter keypress after the value is set.
    pub async fn fill(&self, page: &Page, selector: &str, text: &str) -> Result<String> {
        let selector = Selector::parse(selector)?;
        let (value, submit) = split_submit(text);

        let result = page.client().evaluate(&selector.fill_script(value), false).await?;
        ElementReply::from_result(&selector, result)?;

        if submit {
            page.client().press_enter().await?;
            info!("Filled {} and submitted", selector);
            return Ok(format!("Filled {} and pressed Enter", selector));
        }

        info!("Filled {}", selector);
        Ok(format!("Filled {}", selector))
    }

    /// Choose an option of a `<select>` by value or visible label
    pub async fn select_option(&self, page: &Page, selector: &str, value: &str) -> Result<String> {
        let selector = Selector::parse(selector)?;
        let result = page.client().evaluate(&selector.select_script(value), false).await?;
        let reply = ElementReply::from_result(&selector, result)?;

        if reply.matched != Some(true) {
            return Err(Error::element_not_found(format!("option {:?} in {}", value, selector)));
        }

        let chosen = reply.value.unwrap_or_else(|| value.to_string());
        info!("Selected {:?} in {}", chosen, selector);
        Ok(format!("Selected {:?} in {}", chosen, selector))
    }

    /// Run `expression` in the page, awaiting a returned promise
    pub async fn evaluate(&self, page: &Page, expression: &str) -> Result<EvaluationResult> {
        page.client().evaluate(expression, true).await
    }

    async fn captured(&self, page: &Page, action: &str, result: ActionResult) -> ActionOutcome {
        let record = self.writer.capture_action_state(page, action).await;
        ActionOutcome::new(action, result).with_capture(record)
    }

    pub async fn navigate_with_capture(&self, page: &Page, url: &str) -> Result<ActionOutcome> {
        let outcome = self.navigate(page, url).await?;
        Ok(self.captured(page, "navigate", ActionResult::Navigation(outcome)).await)
    }

    pub async fn click_with_capture(&self, page: &Page, selector: &str) -> Result<ActionOutcome> {
        let message = self.click(page, selector).await?;
        Ok(self.captured(page, "click", ActionResult::Message(message)).await)
    }

    pub async fn fill_with_capture(&self, page: &Page, selector: &str, text: &str) -> Result<ActionOutcome> {
        let message = self.fill(page, selector, text).await?;
        Ok(self.captured(page, "fill", ActionResult::Message(message)).await)
    }

    pub async fn select_option_with_capture(&self, page: &Page, selector: &str, value: &str) -> Result<ActionOutcome> {
        let message = self.select_option(page, selector, value).await?;
        Ok(self.captured(page, "select", ActionResult::Message(message)).await)
    }

    pub async fn evaluate_with_capture(&self, page: &Page, expression: &str) -> Result<ActionOutcome> {
        let value = self.evaluate(page, expression).await?;
        Ok(self.captured(page, "evaluate", ActionResult::Value(value)).await)
    }
}

//! Selector dialects and element scripts
//!
//! A selector starting with `/` is an XPath expression evaluated through
//! `document.evaluate`; anything else goes to `document.querySelector`.
//! Every element script answers with an object carrying `found`, so both
//! dialects report a missing element the same way.

use crate::cdp::EvaluationResult;
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Css,
    XPath,
}

/// A parsed element selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    kind: SelectorKind,
}

/// JSON string literal, safe to splice into a script
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl Selector {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::evaluation("Empty selector"));
        }

        let kind = if trimmed.starts_with('/') {
            SelectorKind::XPath
        } else {
            SelectorKind::Css
        };

        Ok(Self {
            raw: trimmed.to_string(),
            kind,
        })
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Expression evaluating to the first matching element or `null`
    pub fn element_query(&self) -> String {
        match self.kind {
            SelectorKind::Css => format!("document.querySelector({})", js_string(&self.raw)),
            SelectorKind::XPath => format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_string(&self.raw)
            ),
        }
    }

    /// Run `body` with the element bound to `el`. Yields `{found: false}`
    /// when nothing matches.
    pub fn on_element(&self, body: &str) -> String {
        format!(
            "(() => {{ const el = {}; if (!el) return {{ found: false }}; {} }})()",
            self.element_query(),
            body
        )
    }

    /// Boolean presence check
    pub fn exists_script(&self) -> String {
        format!("(() => {} !== null)()", self.element_query())
    }

    pub fn click_script(&self) -> String {
        self.on_element(
            "el.scrollIntoView({ block: 'center' }); el.click(); return { found: true };",
        )
    }

    /// Set the element's value and fire `input` and `change`
    pub fn fill_script(&self, value: &str) -> String {
        self.on_element(&format!(
            "const v = {}; \
             el.focus(); \
             if ('value' in el) {{ el.value = v; }} \
             else if (el.isContentEditable) {{ el.textContent = v; }} \
             else {{ return {{ found: true, error: 'Element is not editable: ' + el.tagName.toLowerCase() }}; }} \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return {{ found: true, value: 'value' in el ? String(el.value) : el.textContent }};",
            js_string(value)
        ))
    }

    /// Pick an option by value, falling back to its visible label
    pub fn select_script(&self, value: &str) -> String {
        self.on_element(&format!(
            "const want = {}; \
             if (el.tagName !== 'SELECT') return {{ found: true, error: 'Element is not a <select>: ' + el.tagName.toLowerCase() }}; \
             const options = Array.from(el.options); \
             const opt = options.find(o => o.value === want) || options.find(o => o.text.trim() === want.trim()); \
             if (!opt) return {{ found: true, matched: false }}; \
             el.value = opt.value; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return {{ found: true, matched: true, value: opt.value }};",
            js_string(value)
        ))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Answer of an element script
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementReply {
    pub found: bool,
    pub matched: Option<bool>,
    pub value: Option<String>,
    pub error: Option<String>,
}

impl ElementReply {
    /// Interpret a script result for `selector`. A missing element becomes
    /// [`Error::ElementNotFound`]; a script-reported problem becomes
    /// [`Error::Evaluation`].
    pub fn from_result(selector: &Selector, result: EvaluationResult) -> Result<Self> {
        let reply: ElementReply = match result {
            EvaluationResult::Object(value) => serde_json::from_value(value)?,
            other => {
                return Err(Error::evaluation(format!(
                    "Unexpected element script result for {}: {}",
                    selector, other
                )))
            }
        };

        if !reply.found {
            return Err(Error::element_not_found(selector.as_str()));
        }
        if let Some(error) = &reply.error {
            return Err(Error::evaluation(error.clone()));
        }

        Ok(reply)
    }
}

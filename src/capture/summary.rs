//! Bounded structural digest of the live DOM
//!
//! One evaluation round-trip returns element counts, landmark flags and up
//! to three clipped headings. The rendered digest has a hard size ceiling
//! no matter how large the page is.

use super::scripts::DOM_SUMMARY_SCRIPT;
use crate::cdp::{CdpClient, EvaluationResult};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Headings kept in a summary
pub const MAX_HEADINGS: usize = 3;

/// Characters kept per heading, ellipsis included
pub const HEADING_CHAR_BUDGET: usize = 60;

/// Upper bound on the rendered digest, in characters
pub const SUMMARY_CHAR_BUDGET: usize = 320;

/// Interactive-element counts, landmark presence and leading headings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomSummary {
    pub buttons: u64,
    pub inputs: u64,
    pub links: u64,
    pub has_navigation: bool,
    pub has_main: bool,
    pub has_form: bool,
    pub headings: Vec<String>,
}

fn clip(text: &str, budget: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= budget {
        return collapsed;
    }
    let mut clipped: String = collapsed.chars().take(budget - 1).collect();
    clipped.push('…');
    clipped
}

impl DomSummary {
    /// Parse a script result, re-applying the heading limits
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let mut summary: DomSummary = serde_json::from_value(value)?;
        summary.headings = summary
            .headings
            .iter()
            .map(|h| clip(h, HEADING_CHAR_BUDGET))
            .filter(|h| !h.is_empty())
            .take(MAX_HEADINGS)
            .collect();
        Ok(summary)
    }

    /// Compact single-line form
    pub fn render(&self) -> String {
        let mut landmarks = Vec::new();
        if self.has_navigation {
            landmarks.push("nav");
        }
        if self.has_main {
            landmarks.push("main");
        }
        if self.has_form {
            landmarks.push("form");
        }
        let landmarks = if landmarks.is_empty() {
            "none".to_string()
        } else {
            landmarks.join(",")
        };

        let headings = self
            .headings
            .iter()
            .take(MAX_HEADINGS)
            .map(|h| format!("\"{}\"", clip(h, HEADING_CHAR_BUDGET)))
            .collect::<Vec<_>>()
            .join(" | ");

        let mut line = format!(
            "buttons={} inputs={} links={} landmarks={}",
            self.buttons, self.inputs, self.links, landmarks
        );
        if !headings.is_empty() {
            line.push_str(" headings=");
            line.push_str(&headings);
        }
        line
    }
}

impl fmt::Display for DomSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Runs the digest script against a page
pub struct DomSummarizer;

impl DomSummarizer {
    pub async fn summarize(client: &CdpClient) -> Result<DomSummary> {
        match client.evaluate(DOM_SUMMARY_SCRIPT, false).await? {
            EvaluationResult::Object(value) => DomSummary::from_value(value),
            other => Err(Error::evaluation(format!("Unexpected DOM summary result: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::MockCdpConnection;
    use std::sync::Arc;

    #[test]
    fn test_near_empty_page_within_budget() {
        let summary = DomSummary::from_value(serde_json::json!({})).unwrap();
        let rendered = summary.render();
        assert_eq!(rendered, "buttons=0 inputs=0 links=0 landmarks=none");
        assert!(rendered.chars().count() <= SUMMARY_CHAR_BUDGET);
    }

    #[test]
    fn test_huge_page_within_budget() {
        let long_heading = "Quarterly results ".repeat(500);
        let summary = DomSummary::from_value(serde_json::json!({
            "buttons": 10000,
            "inputs": 10000,
            "links": 10000,
            "hasNavigation": true,
            "hasMain": true,
            "hasForm": true,
            "headings": vec![long_heading; 10000]
        }))
        .unwrap();

        assert_eq!(summary.headings.len(), MAX_HEADINGS);
        assert!(summary.headings.iter().all(|h| h.chars().count() <= HEADING_CHAR_BUDGET));

        let rendered = summary.render();
        assert!(rendered.contains("buttons=10000"));
        assert!(rendered.contains("landmarks=nav,main,form"));
        assert!(
            rendered.chars().count() <= SUMMARY_CHAR_BUDGET,
            "digest was {} chars",
            rendered.chars().count()
        );
    }

    #[test]
    fn test_clip_keeps_short_text() {
        assert_eq!(clip("  Hello \n  world ", 60), "Hello world");
        assert_eq!(clip("abcdef", 4), "abc…");
    }

    #[tokio::test]
    async fn test_summarize_single_round_trip() {
        let mock = Arc::new(MockCdpConnection::with_handler(|_, _| {
            Ok(MockCdpConnection::evaluate_result(serde_json::json!({
                "buttons": 2,
                "inputs": 1,
                "links": 5,
                "hasNavigation": true,
                "hasMain": false,
                "hasForm": true,
                "headings": ["Welcome"]
            })))
        }));
        let client = CdpClient::new(mock.clone());

        let summary = DomSummarizer::summarize(&client).await.unwrap();

        assert_eq!(mock.calls().len(), 1);
        assert_eq!(summary.links, 5);
        assert_eq!(summary.headings, vec!["Welcome"]);
    }
}

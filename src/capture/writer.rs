//! Capture artifact writer
//!
//! Fetches the page's HTML, markdown rendering, screenshot and console
//! output concurrently and writes whichever succeed under the session
//! directory. A failed fetch or write drops that one artifact and leaves a
//! note on the record.

use super::record::{CaptureRecord, CaptureStage, PageDimensions};
use super::scripts::{MARKDOWN_SCRIPT, OUTER_HTML_SCRIPT, PAGE_METRICS_SCRIPT};
use super::session::{CapturePrefix, CaptureSession};
use super::summary::{DomSummarizer, DomSummary};
use crate::cdp::{ConsoleMessage, EvaluationResult};
use crate::targets::Page;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Console messages echoed on the record itself
pub const DEFAULT_CONSOLE_EXCERPT: usize = 5;

#[derive(Debug, Clone)]
pub struct CaptureArtifactWriter {
    session: Arc<CaptureSession>,
    console_excerpt: usize,
}

impl CaptureArtifactWriter {
    pub fn new(session: Arc<CaptureSession>) -> Self {
        Self {
            session,
            console_excerpt: DEFAULT_CONSOLE_EXCERPT,
        }
    }

    pub fn with_console_excerpt(mut self, messages: usize) -> Self {
        self.console_excerpt = messages;
        self
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    /// Snapshot the page's current state under a fresh prefix.
    ///
    /// Always returns a record; failures are collected in
    /// [`CaptureRecord::errors`].
    pub async fn capture_action_state(&self, page: &Page, label: &str) -> CaptureRecord {
        let started = Instant::now();

        let prefix = match self.session.next_prefix(label) {
            Ok(prefix) => prefix,
            Err(e) => {
                warn!("Capture for {} skipped: {}", label, e);
                let mut record = CaptureRecord::new(label, self.session.base_dir().to_path_buf());
                record.fail(CaptureStage::Prefix, e.to_string());
                return record;
            }
        };

        let client = page.client();

        let (html, markdown, screenshot, console, summary, page_size) = tokio::join!(
            async {
                let html = client.evaluate_string(OUTER_HTML_SCRIPT).await?;
                write_artifact(&prefix, CaptureStage::Html, html.into_bytes()).await
            },
            async {
                let markdown = client.evaluate_string(MARKDOWN_SCRIPT).await?;
                write_artifact(&prefix, CaptureStage::Markdown, markdown.into_bytes()).await
            },
            async {
                let png = client.screenshot().await?;
                write_artifact(&prefix, CaptureStage::Screenshot, png).await
            },
            async {
                let messages = page.events().drain_console(false).await;
                let path = write_artifact(&prefix, CaptureStage::Console, render_console(&messages)).await?;
                Ok::<_, Error>((path, messages))
            },
            DomSummarizer::summarize(client),
            page_dimensions(page),
        );

        let mut record = CaptureRecord::new(prefix.name.clone(), prefix.directory.clone());

        record.html = settle(&mut record, CaptureStage::Html, html);
        record.markdown = settle(&mut record, CaptureStage::Markdown, markdown);
        record.screenshot = settle(&mut record, CaptureStage::Screenshot, screenshot);
        if let Some((path, messages)) = settle(&mut record, CaptureStage::Console, console) {
            record.console_log = Some(path);
            let skip = messages.len().saturating_sub(self.console_excerpt);
            record.console_excerpt = messages.into_iter().skip(skip).collect();
        }
        record.summary = settle::<DomSummary>(&mut record, CaptureStage::Summary, summary);
        record.page_size = settle(&mut record, CaptureStage::PageSize, page_size);

        info!(
            "Captured {} ({} of 4 artifacts, {} errors) in {:?}",
            record.prefix,
            record.artifact_count(),
            record.errors.len(),
            started.elapsed()
        );

        record
    }
}

fn settle<T>(record: &mut CaptureRecord, stage: CaptureStage, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Capture {} {} failed: {}", record.prefix, stage.name(), e);
            record.fail(stage, e.to_string());
            None
        }
    }
}

async fn write_artifact(prefix: &CapturePrefix, stage: CaptureStage, contents: Vec<u8>) -> Result<PathBuf> {
    let suffix = stage
        .suffix()
        .ok_or_else(|| Error::internal(format!("{} has no artifact file", stage.name())))?;
    let path = prefix.path(suffix);
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}

fn render_console(messages: &[ConsoleMessage]) -> Vec<u8> {
    let mut text = messages
        .iter()
        .map(ConsoleMessage::format_line)
        .collect::<Vec<_>>()
        .join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text.into_bytes()
}

async fn page_dimensions(page: &Page) -> Result<PageDimensions> {
    match page.client().evaluate(PAGE_METRICS_SCRIPT, false).await? {
        EvaluationResult::Object(value) => Ok(serde_json::from_value(value)?),
        other => Err(Error::evaluation(format!("Unexpected page metrics result: {}", other))),
    }
}

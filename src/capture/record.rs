//! Capture records

use super::summary::DomSummary;
use crate::cdp::ConsoleMessage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Part of a capture that can fail on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStage {
    Prefix,
    Html,
    Markdown,
    Screenshot,
    Console,
    Summary,
    PageSize,
}

impl CaptureStage {
    /// File name suffix for the artifact this stage writes
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            CaptureStage::Html => Some(".html"),
            CaptureStage::Markdown => Some(".md"),
            CaptureStage::Screenshot => Some(".png"),
            CaptureStage::Console => Some("-console.txt"),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CaptureStage::Prefix => "prefix",
            CaptureStage::Html => "html",
            CaptureStage::Markdown => "markdown",
            CaptureStage::Screenshot => "screenshot",
            CaptureStage::Console => "console",
            CaptureStage::Summary => "summary",
            CaptureStage::PageSize => "page size",
        }
    }
}

/// Non-fatal failure of one capture stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureError {
    pub stage: CaptureStage,
    pub message: String,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage.name(), self.message)
    }
}

/// Document and viewport size in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageDimensions {
    pub width: u32,
    pub height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Artifact set produced for one action
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    /// Sequence + label, e.g. `003-click`
    pub prefix: String,
    pub directory: PathBuf,
    pub html: Option<PathBuf>,
    pub markdown: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
    pub console_log: Option<PathBuf>,
    pub page_size: Option<PageDimensions>,
    pub summary: Option<DomSummary>,
    /// Tail of the console messages drained by this capture
    pub console_excerpt: Vec<ConsoleMessage>,
    pub errors: Vec<CaptureError>,
}

impl CaptureRecord {
    pub fn new<S: Into<String>>(prefix: S, directory: PathBuf) -> Self {
        Self {
            prefix: prefix.into(),
            directory,
            html: None,
            markdown: None,
            screenshot: None,
            console_log: None,
            page_size: None,
            summary: None,
            console_excerpt: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn artifact(&self, stage: CaptureStage) -> Option<&Path> {
        match stage {
            CaptureStage::Html => self.html.as_deref(),
            CaptureStage::Markdown => self.markdown.as_deref(),
            CaptureStage::Screenshot => self.screenshot.as_deref(),
            CaptureStage::Console => self.console_log.as_deref(),
            _ => None,
        }
    }

    /// Number of the four artifact files that were written
    pub fn artifact_count(&self) -> usize {
        [&self.html, &self.markdown, &self.screenshot, &self.console_log]
            .iter()
            .filter(|p| p.is_some())
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// All stage failures joined into one note
    pub fn soft_error(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub(crate) fn fail(&mut self, stage: CaptureStage, message: impl Into<String>) {
        self.errors.push(CaptureError {
            stage,
            message: message.into(),
        });
    }
}

impl fmt::Display for CaptureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Capture {} in {}", self.prefix, self.directory.display())?;

        let written: Vec<String> = [
            CaptureStage::Html,
            CaptureStage::Markdown,
            CaptureStage::Screenshot,
            CaptureStage::Console,
        ]
        .into_iter()
        .filter_map(|stage| {
            self.artifact(stage)
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
        })
        .collect();
        writeln!(f, "Files: {}", if written.is_empty() { "none".to_string() } else { written.join(", ") })?;

        if let Some(size) = &self.page_size {
            writeln!(
                f,
                "Page: {}x{} (viewport {}x{})",
                size.width, size.height, size.viewport_width, size.viewport_height
            )?;
        }
        if let Some(summary) = &self.summary {
            writeln!(f, "DOM: {}", summary)?;
        }
        if !self.console_excerpt.is_empty() {
            writeln!(f, "Console:")?;
            for message in &self.console_excerpt {
                writeln!(f, "  [{}] {}", message.level, message.text)?;
            }
        }
        if let Some(note) = self.soft_error() {
            writeln!(f, "Capture warnings: {}", note)?;
        }
        Ok(())
    }
}

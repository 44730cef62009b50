//! Capture session lifecycle
//!
//! One [`CaptureSession`] owns the archive directory for a process lifetime
//! and hands out numbered file prefixes. It is an explicit context object:
//! construct it once, share it behind an `Arc`, and let a [`SessionGuard`]
//! or [`spawn_signal_cleanup`] remove the directory on the way out.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Width of the zero-padded sequence number
pub const SEQUENCE_WIDTH: usize = 3;

#[derive(Debug, Clone)]
struct SessionRoot {
    path: PathBuf,
    created_at: DateTime<Utc>,
}

/// A numbered artifact prefix such as `003-click`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePrefix {
    pub sequence: u64,
    pub name: String,
    pub directory: PathBuf,
}

impl CapturePrefix {
    /// Full path of the artifact with `suffix` appended to the prefix
    pub fn path(&self, suffix: &str) -> PathBuf {
        self.directory.join(format!("{}{}", self.name, suffix))
    }
}

/// Reduce a label to characters safe in a file name
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        "action".to_string()
    } else {
        cleaned.chars().take(48).collect()
    }
}

#[derive(Debug)]
pub struct CaptureSession {
    base_dir: PathBuf,
    root: Mutex<Option<SessionRoot>>,
    counter: AtomicU64,
    cleaned: AtomicBool,
}

impl CaptureSession {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
            root: Mutex::new(None),
            counter: AtomicU64::new(1),
            cleaned: AtomicBool::new(false),
        }
    }

    /// Create the session directory. Later calls return the same path.
    pub fn initialize(&self) -> Result<PathBuf> {
        let mut root = self
            .root
            .lock()
            .map_err(|_| Error::internal("Capture session lock poisoned"))?;

        if let Some(existing) = root.as_ref() {
            return Ok(existing.path.clone());
        }

        let created_at = Utc::now();
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = self.base_dir.join(format!(
            "capture-{}-{}-{}",
            created_at.format("%Y%m%dT%H%M%S"),
            std::process::id(),
            &id[..8]
        ));

        std::fs::create_dir_all(&path)?;
        info!("Capture session directory: {}", path.display());

        *root = Some(SessionRoot {
            path: path.clone(),
            created_at,
        });
        self.cleaned.store(false, Ordering::SeqCst);

        Ok(path)
    }

    /// Session directory, if initialized
    pub fn root(&self) -> Option<PathBuf> {
        self.root.lock().ok()?.as_ref().map(|r| r.path.clone())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.root.lock().ok()?.as_ref().map(|r| r.created_at)
    }

    /// Captures handed out so far
    pub fn captures_taken(&self) -> u64 {
        self.counter.load(Ordering::SeqCst) - 1
    }

    /// Reserve the next sequence number for `label`, initializing the
    /// session on first use
    pub fn next_prefix(&self, label: &str) -> Result<CapturePrefix> {
        let directory = self.initialize()?;
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst);
        let name = format!(
            "{:0width$}-{}",
            sequence,
            sanitize_label(label),
            width = SEQUENCE_WIDTH
        );
        debug!("Reserved capture prefix {}", name);

        Ok(CapturePrefix {
            sequence,
            name,
            directory,
        })
    }

    /// Remove the session directory. Safe to call repeatedly and from a
    /// termination handler. A capture taken afterwards starts a fresh
    /// directory.
    pub fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }

        let taken = match self.root.lock() {
            Ok(mut root) => root.take(),
            Err(_) => None,
        };
        let Some(SessionRoot { path, .. }) = taken else {
            return;
        };

        match std::fs::remove_dir_all(&path) {
            Ok(()) => info!("Removed capture directory {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove capture directory {}: {}", path.display(), e),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Runs [`CaptureSession::cleanup`] when dropped
#[derive(Debug)]
pub struct SessionGuard {
    session: Arc<CaptureSession>,
}

impl SessionGuard {
    pub fn new(session: Arc<CaptureSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.cleanup();
    }
}

/// Clean up the session and exit when the process is interrupted or
/// terminated
pub fn spawn_signal_cleanup(session: Arc<CaptureSession>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let signal = wait_for_termination().await;
        info!("Received {}, cleaning up capture session", signal);
        session.cleanup();
        std::process::exit(130);
    })
}

#[cfg(unix)]
async fn wait_for_termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl-C"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_initialize_is_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let session = CaptureSession::new(base.path());

        let first = session.initialize().unwrap();
        let second = session.initialize().unwrap();

        assert_eq!(first, second);
        assert!(first.is_dir());
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_prefixes_increase_and_are_fixed_width() {
        let base = tempfile::tempdir().unwrap();
        let session = CaptureSession::new(base.path());

        let names: Vec<String> = ["navigate", "click", "fill"]
            .iter()
            .map(|l| session.next_prefix(l).unwrap().name)
            .collect();

        assert_eq!(names, vec!["001-navigate", "002-click", "003-fill"]);
        assert_eq!(session.captures_taken(), 3);
    }

    #[test]
    fn test_concurrent_prefixes_unique() {
        let base = tempfile::tempdir().unwrap();
        let session = Arc::new(CaptureSession::new(base.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| session.next_prefix("click").unwrap().sequence)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for sequence in handle.join().unwrap() {
                assert!(seen.insert(sequence), "duplicate sequence {}", sequence);
            }
        }
        assert_eq!(seen.len(), 200);
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("select option"), "select-option");
        assert_eq!(sanitize_label("../../etc"), "etc");
        assert_eq!(sanitize_label("  "), "action");
        assert_eq!(sanitize_label("fill_form"), "fill_form");
    }

    #[test]
    fn test_prefix_path() {
        let base = tempfile::tempdir().unwrap();
        let session = CaptureSession::new(base.path());
        let prefix = session.next_prefix("click").unwrap();

        let path = prefix.path("-console.txt");
        assert!(path.starts_with(session.root().unwrap()));
        assert!(path.ends_with("001-click-console.txt"));
    }

    #[test]
    fn test_cleanup_removes_directory_once() {
        let base = tempfile::tempdir().unwrap();
        let session = CaptureSession::new(base.path());
        let root = session.initialize().unwrap();
        std::fs::write(root.join("001-click.html"), "<html></html>").unwrap();

        session.cleanup();
        assert!(!root.exists());
        session.cleanup();
    }

    #[test]
    fn test_capture_after_cleanup_gets_live_directory() {
        let base = tempfile::tempdir().unwrap();
        let session = CaptureSession::new(base.path());
        let old_root = session.next_prefix("navigate").unwrap().directory;

        session.cleanup();
        assert!(session.root().is_none());

        let prefix = session.next_prefix("click").unwrap();
        assert!(prefix.directory.is_dir());
        assert_ne!(prefix.directory, old_root);
        assert_eq!(prefix.name, "002-click");
        std::fs::write(prefix.path(".html"), "<html></html>").unwrap();

        session.cleanup();
        assert!(!prefix.directory.exists());
    }

    #[test]
    fn test_guard_cleans_up_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let session = Arc::new(CaptureSession::new(base.path()));
        let root = session.initialize().unwrap();

        {
            let _guard = SessionGuard::new(Arc::clone(&session));
        }

        assert!(!root.exists());
    }

    #[test]
    fn test_cleanup_before_initialize_is_noop() {
        let base = tempfile::tempdir().unwrap();
        let session = CaptureSession::new(base.path());
        session.cleanup();
        assert!(session.root().is_none());
    }
}

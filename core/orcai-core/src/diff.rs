//! Per-file diff tracking fed by the file watcher.
//!
//! Only the latest transition is kept: every observation becomes the new baseline and its
//! diff replaces the previous one. Intermediate states coalesced by the watcher are lost.

use crate::config::CaptureSettings;
use crate::error::OrcaiError;
use crate::transcript::{read_lines, CaptureLog, FileChangeEntry};
use crate::watcher::FileEventSink;
use similar::TextDiff;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DIFF_CONTEXT_LINES: usize = 3;

pub struct DiffTracker {
    log: Arc<CaptureLog>,
    ignored_suffixes: Vec<String>,
    ignored_prefixes: Vec<PathBuf>,
}

impl DiffTracker {
    pub fn new(log: Arc<CaptureLog>, settings: &CaptureSettings) -> Self {
        Self {
            log,
            ignored_suffixes: settings.ignored_suffixes.clone(),
            ignored_prefixes: settings.ignored_prefixes.clone(),
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self
            .ignored_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
        {
            return true;
        }

        let name = path.to_string_lossy();
        self.ignored_suffixes
            .iter()
            .any(|suffix| !suffix.is_empty() && name.ends_with(suffix.as_str()))
    }

    /// Records a new observation of `path`.
    pub fn observe(&self, path: &Path) {
        let content = match read_lines(path) {
            Ok(content) => content,
            Err(source) => {
                let err = OrcaiError::CaptureReadFailed {
                    path: path.to_path_buf(),
                    source,
                };
                debug!(error = %err, "Skipping file change");
                return;
            }
        };

        let mut changes = self.log.file_changes();
        match changes.get_mut(path) {
            Some(entry) => {
                entry.diff = Some(unified_diff(&entry.last_content, &content));
                entry.last_content = content;
            }
            None => {
                changes.insert(
                    path.to_path_buf(),
                    FileChangeEntry {
                        last_content: content,
                        diff: None,
                    },
                );
            }
        }
    }
}

impl FileEventSink for DiffTracker {
    fn on_file_event(&self, path: &Path, is_directory: bool) {
        if is_directory || self.is_ignored(path) {
            return;
        }
        self.observe(path);
    }

    fn on_watch_error(&self, details: &str) {
        warn!(error = %details, "File watcher reported an error");
    }
}

/// Unified line diff labelled `before` / `after`. Empty when nothing changed.
pub fn unified_diff(before: &[String], after: &[String]) -> String {
    let before = before.concat();
    let after = after.concat();
    TextDiff::from_lines(before.as_str(), after.as_str())
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .header("before", "after")
        .to_string()
}

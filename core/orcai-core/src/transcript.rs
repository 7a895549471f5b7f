//! The three capture logs shared between the multiplexing loop and the watcher thread.
//!
//! Each structure sits behind its own mutex; contention is low (one keystroke-driven writer,
//! one file-event-driven writer), so a lock per structure is enough.

use crate::error::{OrcaiError, Result};
use chrono::{DateTime, Utc};
use fs_err as fs;
use orcai_protocol::{CaptureReport, TRANSCRIPT_VERSION};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last known state of one watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEntry {
    /// Most recently observed full content, split into lines (terminators kept).
    pub last_content: Vec<String>,
    /// Diff between the two most recent observations; `None` after the first one.
    pub diff: Option<String>,
}

#[derive(Debug, Default)]
pub struct CaptureLog {
    commands: Mutex<Vec<String>>,
    file_changes: Mutex<HashMap<PathBuf, FileChangeEntry>>,
    scripts: Mutex<HashMap<PathBuf, Vec<String>>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CaptureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        guard(&self.commands).clear();
        guard(&self.file_changes).clear();
        guard(&self.scripts).clear();
    }

    pub fn is_empty(&self) -> bool {
        guard(&self.commands).is_empty()
            && guard(&self.file_changes).is_empty()
            && guard(&self.scripts).is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn push_command(&self, command: String) {
        guard(&self.commands).push(command);
    }

    pub fn commands(&self) -> Vec<String> {
        guard(&self.commands).clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scripts
    // ─────────────────────────────────────────────────────────────────────────

    /// Stores a snapshot unless one exists. Returns whether it was stored.
    pub(crate) fn insert_script_if_absent(&self, path: &Path, lines: Vec<String>) -> bool {
        let mut scripts = guard(&self.scripts);
        if scripts.contains_key(path) {
            return false;
        }
        scripts.insert(path.to_path_buf(), lines);
        true
    }

    pub fn has_script(&self, path: &Path) -> bool {
        guard(&self.scripts).contains_key(path)
    }

    pub fn script(&self, path: &Path) -> Option<Vec<String>> {
        guard(&self.scripts).get(path).cloned()
    }

    pub fn script_count(&self) -> usize {
        guard(&self.scripts).len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // File changes
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn file_changes(&self) -> MutexGuard<'_, HashMap<PathBuf, FileChangeEntry>> {
        guard(&self.file_changes)
    }

    pub fn file_entry(&self, path: &Path) -> Option<FileChangeEntry> {
        guard(&self.file_changes).get(path).cloned()
    }

    pub fn file_count(&self) -> usize {
        guard(&self.file_changes).len()
    }

    /// Freezes the logs into the transcript handed to the summarizer.
    pub fn report(
        &self,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        shell: Option<&Path>,
    ) -> CaptureReport {
        let file_changes: BTreeMap<String, Option<String>> = guard(&self.file_changes)
            .iter()
            .map(|(path, entry)| (path.display().to_string(), entry.diff.clone()))
            .collect();
        let scripts: BTreeMap<String, String> = guard(&self.scripts)
            .iter()
            .map(|(path, lines)| (path.display().to_string(), lines.concat()))
            .collect();

        CaptureReport {
            version: TRANSCRIPT_VERSION,
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            shell: shell.map(|shell| shell.display().to_string()),
            commands: self.commands(),
            file_changes,
            scripts,
        }
    }
}

/// Reads a text file as lines, keeping line terminators so diffs and snapshots
/// reproduce the file byte for byte.
pub(crate) fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(split_lines(&content))
}

pub(crate) fn split_lines(content: &str) -> Vec<String> {
    content.split_inclusive('\n').map(str::to_string).collect()
}

/// Persists a transcript under `dir` and returns the written path.
pub fn save_transcript(dir: &Path, report: &CaptureReport) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|err| OrcaiError::io("Failed to create transcripts dir", err))?;

    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let path = dir.join(format!("{}.json", stamp));
    let payload = serde_json::to_vec_pretty(report).map_err(|source| OrcaiError::Json {
        context: "Failed to serialize transcript".to_string(),
        source,
    })?;
    fs::write(&path, payload).map_err(|err| OrcaiError::io("Failed to write transcript", err))?;
    Ok(path)
}

pub fn load_transcript(path: &Path) -> Result<CaptureReport> {
    let data = fs::read(path).map_err(|err| OrcaiError::io("Failed to read transcript", err))?;
    orcai_protocol::parse_transcript(&data).map_err(|info| OrcaiError::TranscriptInvalid {
        path: path.to_path_buf(),
        details: info.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn split_lines_keeps_terminators() {
        assert_eq!(split_lines("x\ny\n"), vec!["x\n", "y\n"]);
        assert_eq!(split_lines("x\ny"), vec!["x\n", "y"]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn script_insert_is_first_write_wins() {
        let log = CaptureLog::new();
        let path = Path::new("/tmp/deploy.sh");
        assert!(log.insert_script_if_absent(path, vec!["a\n".to_string()]));
        assert!(!log.insert_script_if_absent(path, vec!["b\n".to_string()]));
        assert_eq!(log.script(path), Some(vec!["a\n".to_string()]));
    }

    #[test]
    fn clear_empties_every_log() {
        let log = CaptureLog::new();
        log.push_command("ls".to_string());
        log.insert_script_if_absent(Path::new("/s.sh"), vec![]);
        log.file_changes().insert(
            PathBuf::from("/f"),
            FileChangeEntry {
                last_content: vec![],
                diff: None,
            },
        );
        assert!(!log.is_empty());

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn report_exposes_diffs_not_content() {
        let log = CaptureLog::new();
        log.push_command("ls -la".to_string());
        log.file_changes().insert(
            PathBuf::from("/etc/motd"),
            FileChangeEntry {
                last_content: vec!["secret\n".to_string()],
                diff: Some("+secret\n".to_string()),
            },
        );
        log.insert_script_if_absent(
            Path::new("/tmp/run.sh"),
            vec!["#!/bin/sh\n".to_string(), "echo hi\n".to_string()],
        );

        let now = Utc::now();
        let report = log.report(now, now, Some(Path::new("/bin/bash")));

        assert_eq!(report.commands, vec!["ls -la"]);
        assert_eq!(
            report.file_changes.get("/etc/motd"),
            Some(&Some("+secret\n".to_string()))
        );
        assert_eq!(
            report.scripts.get("/tmp/run.sh").map(String::as_str),
            Some("#!/bin/sh\necho hi\n")
        );
        assert_eq!(report.shell.as_deref(), Some("/bin/bash"));
        assert!(report.validate().is_ok());
    }

    #[test]
    fn saved_transcript_loads_back() {
        let dir = tempdir().unwrap();
        let log = CaptureLog::new();
        log.push_command("uptime".to_string());
        let now = Utc::now();
        let report = log.report(now, now, None);

        let path = save_transcript(&dir.path().join("transcripts"), &report).unwrap();
        assert_eq!(load_transcript(&path).unwrap(), report);
    }

    #[test]
    fn corrupt_transcript_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"version":1}"#).unwrap();
        assert!(matches!(
            load_transcript(&path),
            Err(OrcaiError::TranscriptInvalid { .. })
        ));
    }
}

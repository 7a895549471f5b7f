//! Capture lifecycle.
//!
//! ## State Machine
//!
//! ```text
//! Idle       → Capturing   begin_capture   (resets logs, starts the file watch)
//! Capturing  → Finalizing  end_capture     (stops the watch, waits for quiescence)
//! Finalizing → Idle        finish_handoff  (after the summarizer ran, success or not)
//! Capturing  → Idle        abort_capture   (shell never started)
//! ```
//!
//! The session owns the three capture logs. The diff tracker gets a shared handle for the
//! watcher thread; everything else borrows the session.

use crate::config::CaptureSettings;
use crate::diff::DiffTracker;
use crate::error::{OrcaiError, Result};
use crate::transcript::CaptureLog;
use crate::watcher::{ActiveWatch, WatchBackend};
use chrono::{DateTime, Utc};
use orcai_protocol::CaptureReport;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Finalizing,
}

struct Lifecycle {
    state: SessionState,
    watch: Option<Box<dyn ActiveWatch>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

pub struct Session {
    settings: CaptureSettings,
    backend: Box<dyn WatchBackend>,
    log: Arc<CaptureLog>,
    lifecycle: Mutex<Lifecycle>,
}

impl Session {
    pub fn new(settings: CaptureSettings, backend: Box<dyn WatchBackend>) -> Self {
        Self {
            settings,
            backend,
            log: Arc::new(CaptureLog::new()),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Idle,
                watch: None,
                started_at: None,
                finished_at: None,
            }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn log(&self) -> &CaptureLog {
        &self.log
    }

    /// Starts a capture: clears the logs and activates the file watch.
    ///
    /// Only legal from `Idle`. A rejected call touches nothing. If the watch cannot be
    /// started the session stays `Idle`.
    pub fn begin_capture(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != SessionState::Idle {
            return Err(OrcaiError::AlreadyCapturing);
        }

        self.log.clear();
        let tracker = Arc::new(DiffTracker::new(Arc::clone(&self.log), &self.settings));
        let watch = self.backend.start(&self.settings.watch_root, tracker)?;

        lifecycle.watch = Some(watch);
        lifecycle.state = SessionState::Capturing;
        lifecycle.started_at = Some(Utc::now());
        lifecycle.finished_at = None;
        info!(root = %self.settings.watch_root.display(), "Capture started");
        Ok(())
    }

    /// Ends a capture. Returns once the watcher has fully stopped, so the logs are stable.
    pub fn end_capture(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != SessionState::Capturing {
            return Err(OrcaiError::NotCapturing);
        }

        if let Some(watch) = lifecycle.watch.take() {
            watch.stop();
        }
        lifecycle.state = SessionState::Finalizing;
        lifecycle.finished_at = Some(Utc::now());
        info!(
            commands = self.log.commands().len(),
            files = self.log.file_count(),
            scripts = self.log.script_count(),
            "Capture stopped"
        );
        Ok(())
    }

    /// Returns to `Idle` after the handoff, whatever its outcome.
    pub fn finish_handoff(&self) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state == SessionState::Finalizing {
            lifecycle.state = SessionState::Idle;
        } else {
            debug!(state = ?lifecycle.state, "finish_handoff outside Finalizing ignored");
        }
    }

    /// Unwinds a capture whose shell could not be started. No handoff follows.
    pub fn abort_capture(&self) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != SessionState::Capturing {
            return;
        }
        if let Some(watch) = lifecycle.watch.take() {
            watch.stop();
        }
        lifecycle.state = SessionState::Idle;
        info!("Capture aborted");
    }

    /// Snapshot of the logs for the summarizer.
    pub fn report(&self) -> CaptureReport {
        let (started_at, finished_at) = {
            let lifecycle = self.lifecycle();
            let now = Utc::now();
            (
                lifecycle.started_at.unwrap_or(now),
                lifecycle.finished_at.unwrap_or(now),
            )
        };
        self.log
            .report(started_at, finished_at, Some(self.settings.shell.as_path()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.abort_capture();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeBackend;
    use super::*;
    use crate::config::StoragePaths;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn session(home: &std::path::Path) -> (Arc<FakeBackend>, Session) {
        let backend = Arc::new(FakeBackend::default());
        let settings = CaptureSettings::new(
            &StoragePaths::with_root(home.to_path_buf()),
            PathBuf::from("/bin/sh"),
        );
        let session = Session::new(settings, Box::new(Arc::clone(&backend)));
        (backend, session)
    }

    #[test]
    fn full_lifecycle() {
        let dir = tempdir().unwrap();
        let (backend, session) = session(dir.path());
        assert_eq!(session.state(), SessionState::Idle);

        session.begin_capture().unwrap();
        assert_eq!(session.state(), SessionState::Capturing);
        assert_eq!(backend.starts.load(Ordering::SeqCst), 1);

        session.end_capture().unwrap();
        assert_eq!(session.state(), SessionState::Finalizing);
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);

        session.finish_handoff();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn begin_while_capturing_fails_without_touching_logs() {
        let dir = tempdir().unwrap();
        let (backend, session) = session(dir.path());
        session.begin_capture().unwrap();
        session.log().push_command("ls".to_string());

        assert!(matches!(
            session.begin_capture(),
            Err(OrcaiError::AlreadyCapturing)
        ));
        assert_eq!(session.log().commands(), vec!["ls"]);
        assert_eq!(session.state(), SessionState::Capturing);
        assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn begin_while_finalizing_fails() {
        let dir = tempdir().unwrap();
        let (_backend, session) = session(dir.path());
        session.begin_capture().unwrap();
        session.end_capture().unwrap();

        assert!(matches!(
            session.begin_capture(),
            Err(OrcaiError::AlreadyCapturing)
        ));
        assert_eq!(session.state(), SessionState::Finalizing);
    }

    #[test]
    fn end_while_idle_fails_and_keeps_state() {
        let dir = tempdir().unwrap();
        let (backend, session) = session(dir.path());

        assert!(matches!(session.end_capture(), Err(OrcaiError::NotCapturing)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(backend.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn begin_resets_previous_logs() {
        let dir = tempdir().unwrap();
        let (_backend, session) = session(dir.path());
        session.begin_capture().unwrap();
        session.log().push_command("first".to_string());
        session.end_capture().unwrap();
        session.finish_handoff();

        session.begin_capture().unwrap();
        assert!(session.log().is_empty());
    }

    #[test]
    fn watch_failure_leaves_session_idle() {
        let dir = tempdir().unwrap();
        let (backend, session) = session(dir.path());
        backend.fail.store(true, Ordering::SeqCst);

        assert!(matches!(
            session.begin_capture(),
            Err(OrcaiError::WatchFailed { .. })
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn file_events_reach_the_diff_tracker() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "a\n").unwrap();

        let (backend, session) = session(dir.path());
        session.begin_capture().unwrap();
        backend.emit(&file);
        std::fs::write(&file, "a\nb\n").unwrap();
        backend.emit(&file);
        session.end_capture().unwrap();

        let report = session.report();
        let diff = report.file_changes[&file.display().to_string()]
            .as_ref()
            .unwrap();
        assert!(diff.contains("+b"));
        assert_eq!(report.shell.as_deref(), Some("/bin/sh"));
    }

    #[test]
    fn abort_returns_to_idle_and_stops_watch() {
        let dir = tempdir().unwrap();
        let (backend, session) = session(dir.path());
        session.begin_capture().unwrap();
        session.abort_capture();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);
    }
}

//! Orchestrates one capture: begin, run the proxied shell, finalize, hand off.
//!
//! Every way the shell session can end (input EOF, shell exit, interrupt, I/O error) funnels
//! into the same `finalize`, which stops the watcher, freezes the logs and calls the
//! summarizer exactly once. Only a failure to start the shell skips the handoff.

use crate::error::Result;
use crate::interceptor::CommandInterceptor;
use crate::pty::{
    multiplex, spawn_attached, window_size, MultiplexIo, RawModeGuard, SignalPipe,
    TerminationReason,
};
use crate::session::Session;
use crate::summarize::Summarizer;
use crate::transcript::save_transcript;
use crate::SESSION_PID_ENV;
use orcai_protocol::CaptureReport;
use std::io;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Result of a completed capture.
#[derive(Debug)]
pub struct CaptureOutcome {
    pub reason: TerminationReason,
    pub report: CaptureReport,
    /// The summarizer's artifact, or why the handoff failed.
    pub artifact: Result<String>,
    /// Where the transcript was persisted after a failed handoff.
    pub saved_transcript: Option<PathBuf>,
}

pub struct CaptureDriver {
    session: Session,
    summarizer: Box<dyn Summarizer>,
    transcripts_dir: Option<PathBuf>,
}

impl CaptureDriver {
    pub fn new(session: Session, summarizer: Box<dyn Summarizer>) -> Self {
        Self {
            session,
            summarizer,
            transcripts_dir: None,
        }
    }

    /// Persist the transcript under `dir` whenever the handoff fails.
    pub fn with_transcripts_dir(mut self, dir: PathBuf) -> Self {
        self.transcripts_dir = Some(dir);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs the configured shell on a PTY attached to this process's terminal.
    pub fn run(&self) -> Result<CaptureOutcome> {
        let shell = self.session.settings().shell.clone();
        self.run_with(|interceptor| run_shell(&shell, interceptor))
    }

    /// Runs a capture around `body`, which drives the interceptor until the session ends.
    ///
    /// An error from `body` means the shell never ran: the capture is aborted without a
    /// handoff and the error is returned.
    pub fn run_with<F>(&self, body: F) -> Result<CaptureOutcome>
    where
        F: FnOnce(&mut CommandInterceptor<'_>) -> Result<TerminationReason>,
    {
        self.session.begin_capture()?;

        let result = {
            let mut interceptor =
                CommandInterceptor::new(self.session.log(), self.session.settings());
            body(&mut interceptor)
        };

        match result {
            Ok(reason) => Ok(self.finalize(reason)),
            Err(err) => {
                error!(error = %err, "Capture could not start");
                self.session.abort_capture();
                Err(err)
            }
        }
    }

    fn finalize(&self, reason: TerminationReason) -> CaptureOutcome {
        info!(reason = %reason, "Finalizing capture");
        if let Err(err) = self.session.end_capture() {
            warn!(error = %err, "Capture was not active at finalize");
        }

        let report = self.session.report();
        let artifact = self.summarizer.summarize(&report);

        let saved_transcript = match (&artifact, &self.transcripts_dir) {
            (Err(_), Some(dir)) => match save_transcript(dir, &report) {
                Ok(path) => {
                    info!(path = %path.display(), "Transcript saved for a later retry");
                    Some(path)
                }
                Err(err) => {
                    warn!(error = %err, "Failed to save transcript");
                    None
                }
            },
            _ => None,
        };

        self.session.finish_handoff();
        CaptureOutcome {
            reason,
            report,
            artifact,
            saved_transcript,
        }
    }
}

/// Proxies `shell` between the real terminal and a fresh PTY until the session ends.
///
/// Returns `Err` only when the shell could not be spawned. The terminal mode is restored and
/// the shell reaped before returning.
pub fn run_shell(shell: &Path, interceptor: &mut CommandInterceptor<'_>) -> Result<TerminationReason> {
    let stdin = io::stdin();
    let input = stdin.as_fd();

    let signals = match SignalPipe::install() {
        Ok(pipe) => Some(pipe),
        Err(err) => {
            warn!(error = %err, "Signal forwarding unavailable");
            None
        }
    };

    let pty = spawn_attached(
        shell,
        window_size(input),
        &[(SESSION_PID_ENV, std::process::id().to_string())],
    )?;

    let raw_mode = match RawModeGuard::enable(input) {
        Ok(guard) => guard,
        Err(err) => {
            warn!(error = %err, "Failed to switch terminal to raw mode");
            None
        }
    };

    let reason = {
        let stdout = io::stdout();
        let mut output = stdout.lock();
        multiplex(
            MultiplexIo {
                pty: pty.master_fd(),
                input,
                signals: signals.as_ref(),
            },
            &mut output,
            interceptor,
            &pty,
        )
    };

    drop(raw_mode);
    let exit_code = pty.close();
    info!(reason = %reason, exit_code = ?exit_code, "Shell session ended");
    Ok(reason)
}

//! Best-effort snapshots of scripts the user runs during a capture.

use crate::error::OrcaiError;
use crate::transcript::{read_lines, CaptureLog};
use std::path::Path;
use tracing::{info, warn};

pub struct ScriptCapture<'a> {
    log: &'a CaptureLog,
}

impl<'a> ScriptCapture<'a> {
    pub fn new(log: &'a CaptureLog) -> Self {
        Self { log }
    }

    /// Snapshots `path` the first time it is invoked; later calls are no-ops.
    ///
    /// Read failures are logged and swallowed so a vanished or unreadable script
    /// never ends the session.
    pub fn capture(&self, path: &Path) {
        if self.log.has_script(path) {
            return;
        }

        match read_lines(path) {
            Ok(lines) => {
                if self.log.insert_script_if_absent(path, lines) {
                    info!(path = %path.display(), "Captured script");
                }
            }
            Err(source) => {
                let err = OrcaiError::CaptureReadFailed {
                    path: path.to_path_buf(),
                    source,
                };
                warn!(error = %err, "Script capture failed");
            }
        }
    }
}

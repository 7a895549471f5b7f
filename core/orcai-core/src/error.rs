//! Error types for orcai-core operations.

use std::path::PathBuf;

/// All errors that can occur while capturing or handing off a session.
#[derive(Debug, thiserror::Error)]
pub enum OrcaiError {
    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Capture is already running")]
    AlreadyCapturing,

    #[error("No capture to stop")]
    NotCapturing,

    #[error("Failed to start file watcher on {root}: {details}")]
    WatchFailed { root: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // PTY Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to spawn shell {shell}: {source}")]
    SpawnFailed {
        shell: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Capture Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to read {path}: {source}")]
    CaptureReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration write failed: {path}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Transcript invalid: {path}: {details}")]
    TranscriptInvalid { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Handoff Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Missing configuration: {0} (run `orcai config`)")]
    PreconditionFailed(String),

    #[error("Error generating playbook: {0}")]
    TransportFailed(String),

    #[error("Error generating playbook: HTTP {status}: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl OrcaiError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        OrcaiError::Io {
            context: context.into(),
            source,
        }
    }

    /// True for failures of the summarization handoff, which never end the process.
    pub fn is_handoff_failure(&self) -> bool {
        matches!(
            self,
            OrcaiError::PreconditionFailed(_)
                | OrcaiError::TransportFailed(_)
                | OrcaiError::UpstreamError { .. }
        )
    }
}

/// Convenience type alias for Results using OrcaiError.
pub type Result<T> = std::result::Result<T, OrcaiError>;

//! # orcai-core
//!
//! Capture engine for orcai: records what a user does in an interactive shell and hands the
//! transcript to a summarization service that turns it into an Ansible playbook.
//!
//! ## Design Principles
//!
//! - **Transparent proxy**: the user's shell runs on a PTY; every byte is forwarded unmodified.
//! - **Synchronous**: one `poll(2)` loop plus a watcher drain thread. No async runtime.
//! - **Best effort capture**: unreadable files and scripts are logged and skipped, never fatal.
//! - **One handoff per capture**: however the session ends, the summarizer runs exactly once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use orcai_core::{
//!     CaptureDriver, CaptureSettings, HttpSummarizer, NotifyBackend, Session, StoragePaths,
//! };
//!
//! let paths = StoragePaths::from_home()?;
//! let session = Session::new(CaptureSettings::from_env(&paths), Box::new(NotifyBackend));
//! let driver = CaptureDriver::new(session, Box::new(HttpSummarizer::new(config)));
//! let outcome = driver.run()?;
//! ```

pub const PROGRAM_NAME: &str = "orcai";

/// Set in the proxied shell's environment to the capturing process's pid.
pub const SESSION_PID_ENV: &str = "ORCAI_SESSION_PID";

pub mod capture;
pub mod config;
pub mod diff;
pub mod error;
pub mod interceptor;
pub mod pty;
pub mod script;
pub mod session;
pub mod summarize;
pub mod transcript;
pub mod watcher;

pub use capture::{run_shell, CaptureDriver, CaptureOutcome};
pub use config::{
    default_shell, load_config, save_config, CaptureSettings, ConfigOverrides, OrcaiConfig,
    StoragePaths,
};
pub use diff::{unified_diff, DiffTracker};
pub use error::{OrcaiError, Result};
pub use interceptor::{CommandInterceptor, LineAssembler};
pub use pty::{PtySession, TerminationReason};
pub use script::ScriptCapture;
pub use session::{Session, SessionState};
pub use summarize::{HttpSummarizer, RetryPolicy, Summarizer};
pub use transcript::{load_transcript, save_transcript, CaptureLog, FileChangeEntry};
pub use watcher::{ActiveWatch, FileEventSink, NotifyBackend, WatchBackend};

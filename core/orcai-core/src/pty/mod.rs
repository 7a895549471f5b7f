//! Running the user's shell behind a pseudo-terminal.
//!
//! - `spawn`: fork the shell onto a fresh PTY and reap it afterwards
//! - `terminal`: raw mode and window size on the real terminal
//! - `signals`: self-pipe for SIGINT/SIGTERM/SIGHUP/SIGWINCH
//! - `multiplex`: the poll loop copying bytes in both directions

pub mod multiplex;
pub mod signals;
pub mod spawn;
pub mod terminal;

use std::io;

pub use multiplex::{multiplex, MultiplexIo, TerminationReason, CHUNK_SIZE};
pub use signals::{SignalEvent, SignalPipe};
pub use spawn::{spawn_attached, PtySession};
pub use terminal::{set_window_size, window_size, RawModeGuard};

/// What the multiplexer needs from the child process.
pub trait ChildControl {
    /// Asks the child to exit. Must tolerate a child that is already gone.
    fn terminate(&self) -> io::Result<()>;
}

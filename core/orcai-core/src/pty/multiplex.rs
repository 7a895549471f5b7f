//! The I/O multiplexing loop between the real terminal and the PTY.
//!
//! Single-threaded: one `poll(2)` over the PTY master, the terminal input and the signal
//! pipe. Shell output is copied to the terminal and flushed immediately. Terminal input is
//! shown to the command interceptor as raw bytes, then forwarded to the shell byte for byte.

use super::signals::{SignalEvent, SignalPipe};
use super::terminal::{set_window_size, window_size};
use super::ChildControl;
use crate::interceptor::CommandInterceptor;
use std::fmt;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, BorrowedFd};
use tracing::{debug, info, warn};

pub const CHUNK_SIZE: usize = 4096;

/// Why the loop ended.
#[derive(Debug)]
pub enum TerminationReason {
    /// The terminal input reached end-of-file.
    UserEof,
    /// The shell exited on its own.
    ShellExited,
    /// The capturing process received SIGINT, SIGTERM or SIGHUP.
    Interrupted,
    /// A descriptor failed mid-session.
    Io(io::Error),
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::UserEof => write!(f, "end of input"),
            TerminationReason::ShellExited => write!(f, "shell exited"),
            TerminationReason::Interrupted => write!(f, "interrupted"),
            TerminationReason::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

/// Descriptors the loop waits on.
pub struct MultiplexIo<'a> {
    pub pty: BorrowedFd<'a>,
    pub input: BorrowedFd<'a>,
    pub signals: Option<&'a SignalPipe>,
}

const PTY: usize = 0;
const INPUT: usize = 1;
const SIGNALS: usize = 2;

const READABLE: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;

/// Runs until the shell exits, input ends, an interrupt arrives or a descriptor fails.
///
/// Every path except `ShellExited` sends the child a termination signal before returning.
pub fn multiplex<W: Write>(
    io: MultiplexIo<'_>,
    output: &mut W,
    interceptor: &mut CommandInterceptor<'_>,
    child: &dyn ChildControl,
) -> TerminationReason {
    let reason = run_loop(&io, output, interceptor);
    if !matches!(reason, TerminationReason::ShellExited) {
        if let Err(err) = child.terminate() {
            warn!(error = %err, "Failed to signal shell");
        }
    }
    debug!(reason = %reason, "Multiplex loop ended");
    reason
}

fn run_loop<W: Write>(
    io: &MultiplexIo<'_>,
    output: &mut W,
    interceptor: &mut CommandInterceptor<'_>,
) -> TerminationReason {
    let mut buf = [0u8; CHUNK_SIZE];
    let signal_fd = io.signals.map_or(-1, |pipe| pipe.read_fd().as_raw_fd());

    loop {
        // A negative fd makes poll skip the slot.
        let mut fds = [
            pollfd(io.pty.as_raw_fd()),
            pollfd(io.input.as_raw_fd()),
            pollfd(signal_fd),
        ];

        // SAFETY: fds is a valid, correctly sized array for the duration of the call.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return TerminationReason::Io(err);
        }

        for slot in [PTY, INPUT] {
            if fds[slot].revents & libc::POLLNVAL != 0 {
                return TerminationReason::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "descriptor closed under the multiplexer",
                ));
            }
        }

        if fds[SIGNALS].revents & libc::POLLIN != 0 {
            if let Some(pipe) = io.signals {
                for event in pipe.drain() {
                    match event {
                        SignalEvent::Interrupt(signal) => {
                            info!(signal, "Capture interrupted");
                            return TerminationReason::Interrupted;
                        }
                        SignalEvent::Resize => propagate_resize(io),
                    }
                }
            }
        }

        if fds[PTY].revents & READABLE != 0 {
            match read_fd(io.pty, &mut buf) {
                Ok(0) => return TerminationReason::ShellExited,
                Ok(n) => {
                    if let Err(err) = output.write_all(&buf[..n]).and_then(|_| output.flush()) {
                        return TerminationReason::Io(err);
                    }
                }
                Err(err) if is_hangup(&err) => return TerminationReason::ShellExited,
                Err(err) => return TerminationReason::Io(err),
            }
        }

        if fds[INPUT].revents & READABLE != 0 {
            match read_fd(io.input, &mut buf) {
                Ok(0) => return TerminationReason::UserEof,
                Ok(n) => {
                    let chunk = &buf[..n];
                    interceptor.feed_bytes(chunk);
                    match write_all_fd(io.pty, chunk) {
                        Ok(()) => {}
                        Err(err) if is_hangup(&err) => return TerminationReason::ShellExited,
                        Err(err) => return TerminationReason::Io(err),
                    }
                }
                Err(err) => return TerminationReason::Io(err),
            }
        }
    }
}

fn pollfd(fd: libc::c_int) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

fn propagate_resize(io: &MultiplexIo<'_>) {
    if let Some(size) = window_size(io.input) {
        if let Err(err) = set_window_size(io.pty, size) {
            debug!(error = %err, "Failed to resize PTY");
        }
    }
}

/// Linux reports a PTY whose slave side closed as EIO rather than EOF.
fn is_hangup(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EIO)
}

fn read_fd(fd: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        // SAFETY: reading into a live, correctly sized buffer.
        #[allow(unsafe_code)]
        let n = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn write_all_fd(fd: BorrowedFd<'_>, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        // SAFETY: writing from a live slice.
        #[allow(unsafe_code)]
        let n = unsafe { libc::write(fd.as_raw_fd(), data.as_ptr() as *const libc::c_void, data.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "PTY accepted no bytes"));
        }
        data = &data[n as usize..];
    }
    Ok(())
}

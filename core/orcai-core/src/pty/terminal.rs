//! Real-terminal modes and window size.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use tracing::warn;

/// Puts a terminal in raw mode and restores the original settings on drop.
///
/// Raw mode hands every keystroke (Ctrl-C and Ctrl-D included) straight to the proxied
/// shell, which runs its own line discipline on the PTY.
pub struct RawModeGuard {
    fd: RawFd,
    original: libc::termios,
}

impl RawModeGuard {
    /// Returns `Ok(None)` when `fd` is not a terminal (piped input): nothing to switch.
    pub fn enable(fd: BorrowedFd<'_>) -> io::Result<Option<Self>> {
        let fd = fd.as_raw_fd();
        if !is_terminal(fd) {
            return Ok(None);
        }

        let mut original = MaybeUninit::<libc::termios>::uninit();
        // SAFETY: tcgetattr fills the struct on success, which we check before reading it.
        #[allow(unsafe_code)]
        let original = unsafe {
            if libc::tcgetattr(fd, original.as_mut_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            original.assume_init()
        };

        let mut raw = original;
        // SAFETY: cfmakeraw only edits the struct; tcsetattr reads a fully initialised one.
        #[allow(unsafe_code)]
        unsafe {
            libc::cfmakeraw(&mut raw);
            if libc::tcsetattr(fd, libc::TCSANOW, &raw) != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(Some(Self { fd, original }))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // SAFETY: restoring settings captured from the same descriptor.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &self.original) };
        if rc != 0 {
            warn!(error = %io::Error::last_os_error(), "Failed to restore terminal mode");
        }
    }
}

fn is_terminal(fd: RawFd) -> bool {
    // SAFETY: isatty has no preconditions.
    #[allow(unsafe_code)]
    unsafe {
        libc::isatty(fd) == 1
    }
}

/// The terminal's current size, or `None` if `fd` is not a sized terminal.
pub fn window_size(fd: BorrowedFd<'_>) -> Option<libc::winsize> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes into a winsize we own.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCGWINSZ, &mut size) };
    if rc != 0 || size.ws_row == 0 || size.ws_col == 0 {
        return None;
    }
    Some(size)
}

pub fn set_window_size(fd: BorrowedFd<'_>, size: libc::winsize) -> io::Result<()> {
    // SAFETY: TIOCSWINSZ reads a winsize we own.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCSWINSZ, &size) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

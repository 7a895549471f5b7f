//! Spawning the user's shell on a fresh pseudo-terminal.

use super::ChildControl;
use crate::error::{OrcaiError, Result};
use std::ffi::{CString, OsStr};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const EXEC_FAILED_STATUS: libc::c_int = 127;
const REAP_GRACE: Duration = Duration::from_secs(2);
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Parent-side handle to a shell running on a PTY.
///
/// Owns the master descriptor and the child pid. Dropping it closes the master, hangs up
/// the child and reaps it.
#[derive(Debug)]
pub struct PtySession {
    pid: libc::pid_t,
    master: OwnedFd,
    reaped: bool,
    exit_code: Option<i32>,
}

/// Forks a child attached to a new PTY and execs `shell` in it.
///
/// The child branch never returns: it either becomes the shell or exits with status 127.
/// A shell that cannot be executed is reported here as `SpawnFailed`, after the child has
/// been reaped.
/// `extra_env` is added to (and overrides) the inherited environment.
pub fn spawn_attached(
    shell: &Path,
    size: Option<libc::winsize>,
    extra_env: &[(&str, String)],
) -> Result<PtySession> {
    let spawn_failed = |source: io::Error| OrcaiError::SpawnFailed {
        shell: shell.to_path_buf(),
        source,
    };

    // Everything the child needs is prepared before fork; the child only calls execve/_exit.
    let program = c_string(shell.as_os_str()).map_err(spawn_failed)?;
    let argv: [*const libc::c_char; 2] = [program.as_ptr(), std::ptr::null()];
    let env = build_env(extra_env);
    let envp: Vec<*const libc::c_char> = env
        .iter()
        .map(|entry| entry.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect();

    let mut winsize = size;
    let winp = winsize
        .as_mut()
        .map_or(std::ptr::null_mut(), |ws| ws as *mut libc::winsize);

    // Reports a failed execve back to the parent. Both ends close on a successful exec, so
    // reading EOF means the shell is running.
    let (exec_read, exec_write) = exec_status_pipe().map_err(spawn_failed)?;
    let exec_write_fd = exec_write.as_raw_fd();

    let mut master_fd: libc::c_int = -1;
    // SAFETY: forkpty writes the master fd on success. In the child we only call
    // async-signal-safe functions (execve, write, _exit) on memory prepared before the fork.
    #[allow(unsafe_code)]
    let pid = unsafe {
        libc::forkpty(
            &mut master_fd as *mut libc::c_int,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            winp,
        )
    };

    if pid < 0 {
        return Err(spawn_failed(io::Error::last_os_error()));
    }

    if pid == 0 {
        #[allow(unsafe_code)]
        unsafe {
            libc::execve(program.as_ptr(), argv.as_ptr(), envp.as_ptr());
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0).to_ne_bytes();
            libc::write(
                exec_write_fd,
                errno.as_ptr() as *const libc::c_void,
                errno.len(),
            );
            libc::_exit(EXEC_FAILED_STATUS);
        }
    }

    // SAFETY: forkpty returned a valid master descriptor that nothing else owns.
    #[allow(unsafe_code)]
    let master = unsafe { OwnedFd::from_raw_fd(master_fd) };
    if let Err(err) = set_cloexec(master.as_fd()) {
        debug!(error = %err, "Failed to mark PTY master close-on-exec");
    }
    let session = PtySession {
        pid,
        master,
        reaped: false,
        exit_code: None,
    };

    drop(exec_write);
    if let Some(errno) = read_exec_status(exec_read.as_fd()).map_err(spawn_failed)? {
        // Dropping the session reaps the child, which has already exited.
        drop(session);
        return Err(spawn_failed(io::Error::from_raw_os_error(errno)));
    }

    debug!(pid, shell = %shell.display(), "Shell spawned on PTY");
    Ok(session)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn exec_status_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: pipe2(2) fills both descriptors on success.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and are owned by nothing else.
    #[allow(unsafe_code)]
    let pair = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    Ok(pair)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn exec_status_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: pipe(2) fills both descriptors on success.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and are owned by nothing else.
    #[allow(unsafe_code)]
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    // Without close-on-exec the shell would hold the write end and the parent would block.
    set_cloexec(read.as_fd())?;
    set_cloexec(write.as_fd())?;
    Ok((read, write))
}

/// Waits for the child to either exec (EOF) or report the errno of a failed exec.
fn read_exec_status(fd: BorrowedFd<'_>) -> io::Result<Option<i32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        // SAFETY: reading into the unfilled tail of a local buffer.
        #[allow(unsafe_code)]
        let n = unsafe {
            libc::read(
                fd.as_raw_fd(),
                buf[filled..].as_mut_ptr() as *mut libc::c_void,
                buf.len() - filled,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if n == 0 {
            break;
        }
        filled += n as usize;
    }

    match filled {
        0 => Ok(None),
        4 => Ok(Some(i32::from_ne_bytes(buf))),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated exec status from child",
        )),
    }
}

fn c_string(value: &OsStr) -> io::Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "path contains an interior NUL byte",
        )
    })
}

fn build_env(extra_env: &[(&str, String)]) -> Vec<CString> {
    let overridden = |key: &OsStr| extra_env.iter().any(|(name, _)| OsStr::new(name) == key);

    std::env::vars_os()
        .filter(|(key, _)| !overridden(key))
        .map(|(key, value)| {
            let mut entry = key.as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            entry
        })
        .chain(
            extra_env
                .iter()
                .map(|(key, value)| format!("{}={}", key, value).into_bytes()),
        )
        .filter_map(|entry| CString::new(entry).ok())
        .collect()
}

fn set_cloexec(fd: BorrowedFd<'_>) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own.
    #[allow(unsafe_code)]
    let rc = unsafe {
        let flags = libc::fcntl(fd.as_raw_fd(), libc::F_GETFD);
        if flags < 0 {
            flags
        } else {
            libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, flags | libc::FD_CLOEXEC)
        }
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl PtySession {
    pub fn pid(&self) -> u32 {
        self.pid as u32
    }

    /// The master side of the PTY.
    pub fn master_fd(&self) -> BorrowedFd<'_> {
        self.master.as_fd()
    }

    /// Hangs up the shell, reaps it and closes the master.
    ///
    /// Returns the exit code (128 + signal for signalled exits) when it could be observed.
    pub fn close(mut self) -> Option<i32> {
        self.teardown();
        self.exit_code
    }

    fn send_signal(&self, signal: libc::c_int) -> io::Result<()> {
        // SAFETY: plain kill(2) on our own child.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(self.pid, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // Already gone.
            return Ok(());
        }
        Err(err)
    }

    fn teardown(&mut self) {
        if self.reaped {
            return;
        }
        self.reaped = true;

        if let Err(err) = self.send_signal(libc::SIGHUP) {
            warn!(pid = self.pid, error = %err, "Failed to hang up shell");
        }

        let deadline = Instant::now() + REAP_GRACE;
        loop {
            match self.try_reap(libc::WNOHANG) {
                Reap::Done(code) => {
                    self.exit_code = code;
                    return;
                }
                Reap::Running if Instant::now() < deadline => thread::sleep(REAP_POLL_INTERVAL),
                Reap::Running => break,
            }
        }

        warn!(pid = self.pid, "Shell ignored hangup; killing");
        let _ = self.send_signal(libc::SIGKILL);
        if let Reap::Done(code) = self.try_reap(0) {
            self.exit_code = code;
        }
    }

    fn try_reap(&self, flags: libc::c_int) -> Reap {
        let mut status: libc::c_int = 0;
        loop {
            // SAFETY: waitpid on our own child with a valid status pointer.
            #[allow(unsafe_code)]
            let rc = unsafe { libc::waitpid(self.pid, &mut status, flags) };
            if rc == 0 {
                return Reap::Running;
            }
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                // ECHILD: somebody else reaped it.
                debug!(pid = self.pid, error = %err, "waitpid failed");
                return Reap::Done(None);
            }
            return Reap::Done(decode_status(status));
        }
    }
}

enum Reap {
    Running,
    Done(Option<i32>),
}

fn decode_status(status: libc::c_int) -> Option<i32> {
    if libc::WIFEXITED(status) {
        Some(libc::WEXITSTATUS(status))
    } else if libc::WIFSIGNALED(status) {
        Some(128 + libc::WTERMSIG(status))
    } else {
        None
    }
}

impl ChildControl for PtySession {
    fn terminate(&self) -> io::Result<()> {
        self.send_signal(libc::SIGHUP)
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.teardown();
    }
}

//! Self-pipe delivery of process signals into the multiplexing loop.
//!
//! Handlers write the signal number into a non-blocking pipe; the loop polls the read end
//! alongside the PTY and the terminal, so an interrupt wakes it without busy waiting.
//! Only one pipe may be installed per process.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicI32, Ordering};

static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

const INTERRUPT_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];
const HANDLED_SIGNALS: [libc::c_int; 4] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP, libc::SIGWINCH];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// The capturing process was asked to stop.
    Interrupt(libc::c_int),
    /// The real terminal changed size.
    Resize,
}

pub struct SignalPipe {
    read: OwnedFd,
    _write: OwnedFd,
    previous: Vec<(libc::c_int, libc::sigaction)>,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[allow(unsafe_code)]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
#[allow(unsafe_code)]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

extern "C" fn forward_signal(signum: libc::c_int) {
    let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    let byte = signum as u8;
    // SAFETY: write(2) is async-signal-safe; errno is saved and restored around it so the
    // interrupted code sees its own error value.
    #[allow(unsafe_code)]
    unsafe {
        let saved = *errno_location();
        libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        *errno_location() = saved;
    }
}

impl SignalPipe {
    pub fn install() -> io::Result<Self> {
        let mut fds = [-1 as libc::c_int; 2];
        // SAFETY: pipe(2) fills both descriptors on success.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: both descriptors were just created and are owned here.
        #[allow(unsafe_code)]
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_flags(read.as_fd())?;
        set_flags(write.as_fd())?;

        if PIPE_WRITE_FD
            .compare_exchange(-1, write.as_raw_fd(), Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "signal pipe already installed",
            ));
        }

        let mut pipe = Self {
            read,
            _write: write,
            previous: Vec::with_capacity(HANDLED_SIGNALS.len()),
        };
        for signal in HANDLED_SIGNALS {
            // Drop restores whatever was installed so far.
            let previous = install_handler(signal)?;
            pipe.previous.push((signal, previous));
        }
        Ok(pipe)
    }

    pub fn read_fd(&self) -> BorrowedFd<'_> {
        self.read.as_fd()
    }

    /// Reads every pending signal. Never blocks.
    pub fn drain(&self) -> Vec<SignalEvent> {
        let mut events = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            // SAFETY: reading into a local buffer from our non-blocking pipe.
            #[allow(unsafe_code)]
            let n = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n <= 0 {
                break;
            }
            events.extend(buf[..n as usize].iter().map(|&byte| classify(byte as libc::c_int)));
        }
        events
    }
}

fn classify(signum: libc::c_int) -> SignalEvent {
    if INTERRUPT_SIGNALS.contains(&signum) {
        SignalEvent::Interrupt(signum)
    } else {
        SignalEvent::Resize
    }
}

fn set_flags(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: fcntl flag updates on a descriptor we own.
    #[allow(unsafe_code)]
    unsafe {
        let flags = libc::fcntl(raw, libc::F_GETFL);
        if flags < 0 || libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd_flags = libc::fcntl(raw, libc::F_GETFD);
        if fd_flags < 0 || libc::fcntl(raw, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn install_handler(signal: libc::c_int) -> io::Result<libc::sigaction> {
    // SAFETY: zeroed sigaction is a valid "no flags, empty mask" starting point; the handler
    // only touches an atomic and write(2).
    #[allow(unsafe_code)]
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = forward_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);

        let mut previous: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signal, &action, &mut previous) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(previous)
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        for (signal, previous) in self.previous.drain(..) {
            // SAFETY: reinstalling the disposition captured at install time.
            #[allow(unsafe_code)]
            unsafe {
                libc::sigaction(signal, &previous, std::ptr::null_mut());
            }
        }
        PIPE_WRITE_FD.store(-1, Ordering::SeqCst);
    }
}

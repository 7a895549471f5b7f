//! `orcai stop`: ends the capture this shell belongs to.
//!
//! The capturing process exports its pid into the proxied shell. Sending it SIGTERM makes the
//! multiplexing loop finish with `Interrupted`, which then runs the normal handoff.

use orcai_core::SESSION_PID_ENV;
use std::env;
use std::io;

#[derive(Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Signalled(libc::pid_t),
    NoCapture,
}

pub fn run() -> io::Result<StopOutcome> {
    match session_pid(env::var(SESSION_PID_ENV).ok().as_deref()) {
        Some(pid) => signal_capture(pid),
        None => Ok(StopOutcome::NoCapture),
    }
}

fn session_pid(value: Option<&str>) -> Option<libc::pid_t> {
    value?.trim().parse::<libc::pid_t>().ok().filter(|pid| *pid > 1)
}

fn signal_capture(pid: libc::pid_t) -> io::Result<StopOutcome> {
    // SAFETY: kill(2) with a validated positive pid.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        tracing::info!(pid, "Sent SIGTERM to capture");
        return Ok(StopOutcome::Signalled(pid));
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Stale variable: the capture already ended.
        return Ok(StopOutcome::NoCapture);
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_plausible_pids() {
        assert_eq!(session_pid(Some("4242")), Some(4242));
        assert_eq!(session_pid(Some(" 4242\n")), Some(4242));
        assert_eq!(session_pid(Some("1")), None);
        assert_eq!(session_pid(Some("-5")), None);
        assert_eq!(session_pid(Some("abc")), None);
        assert_eq!(session_pid(None), None);
    }

    #[test]
    fn exited_process_means_no_capture() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as libc::pid_t;
        child.wait().unwrap();

        assert_eq!(signal_capture(pid).unwrap(), StopOutcome::NoCapture);
    }
}

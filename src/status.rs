//! Portable exit status, wrapping the raw `waitpid(2)` status word.

use std::fmt;

/// Exit status of a finished child process.
///
/// Wraps the raw status word returned by `waitpid`. Use [`code`](Self::code)
/// and [`signal`](Self::signal) to decode it; [`success`](Self::success) is
/// the common case.
///
/// A status can be [`undetermined`](Self::is_undetermined) when some other
/// party reaped the pid before this crate could (`ECHILD`); no exit
/// information is recoverable in that case.
#[derive(Eq, PartialEq, Hash, Copy, Clone)]
pub struct ExitStatus(pub(crate) Option<i32>);

impl ExitStatus {
    /// Builds a status as if the process had called `exit(code)`.
    ///
    /// `code` is truncated to the low 8 bits, matching OS convention.
    pub fn exited(code: i32) -> ExitStatus {
        ExitStatus(Some((code & 0xff) << 8))
    }

    /// Builds a status as if the process had been terminated by `signal`.
    pub fn signaled(signal: i32) -> ExitStatus {
        ExitStatus(Some(signal & 0x7f))
    }

    /// Builds a status from a raw `waitpid` status word.
    pub fn from_raw(raw: i32) -> ExitStatus {
        ExitStatus(Some(raw))
    }

    /// Builds the "no information available" status (e.g. after `ECHILD`).
    pub fn undetermined() -> ExitStatus {
        ExitStatus(None)
    }

    /// True when no exit information could be recovered for this process.
    pub fn is_undetermined(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the exit code if the process exited normally (not via signal).
    pub fn code(&self) -> Option<i32> {
        let raw = self.0?;
        libc::WIFEXITED(raw).then(|| libc::WEXITSTATUS(raw))
    }

    /// Returns the signal number if the process was killed by a signal.
    pub fn signal(&self) -> Option<i32> {
        let raw = self.0?;
        libc::WIFSIGNALED(raw).then(|| libc::WTERMSIG(raw))
    }

    /// True if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code() == Some(0)
    }

    /// True if the process was killed by the given signal number.
    pub fn is_killed_by(&self, signum: i32) -> bool {
        self.signal() == Some(signum)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(raw) if libc::WIFEXITED(raw) => write!(f, "exit code {}", libc::WEXITSTATUS(raw)),
            Some(raw) if libc::WIFSIGNALED(raw) => write!(f, "signal {}", libc::WTERMSIG(raw)),
            Some(raw) => write!(f, "unrecognized wait status: {raw} {raw:#x}"),
            None => write!(f, "undetermined exit status"),
        }
    }
}

impl fmt::Debug for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(raw) if libc::WIFEXITED(raw) => {
                write!(f, "ExitStatus(Exited({}))", libc::WEXITSTATUS(raw))
            }
            Some(raw) if libc::WIFSIGNALED(raw) => {
                write!(f, "ExitStatus(Signaled({}))", libc::WTERMSIG(raw))
            }
            Some(raw) => write!(f, "ExitStatus(Other({raw:#x}))"),
            None => write!(f, "ExitStatus(Undetermined)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exited_round_trips_code() {
        assert_eq!(ExitStatus::exited(0).code(), Some(0));
        assert_eq!(ExitStatus::exited(5).code(), Some(5));
        assert!(ExitStatus::exited(0).success());
        assert!(!ExitStatus::exited(1).success());
    }

    #[test]
    fn signaled_has_no_code() {
        let st = ExitStatus::signaled(libc::SIGTERM);
        assert_eq!(st.code(), None);
        assert_eq!(st.signal(), Some(libc::SIGTERM));
        assert!(st.is_killed_by(libc::SIGTERM));
    }

    #[test]
    fn undetermined_has_no_code_or_signal() {
        let st = ExitStatus::undetermined();
        assert!(st.is_undetermined());
        assert_eq!(st.code(), None);
        assert_eq!(st.signal(), None);
    }
}

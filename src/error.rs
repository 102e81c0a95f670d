//! The closed error taxonomy returned by every fallible operation in this
//! crate (lowering, spawn, wait, drain, pipe I/O).

use std::fmt;
use std::io;

/// The closed set of failure categories a caller can match on.
///
/// This set is intentionally closed (`#[non_exhaustive]` is *not* applied):
/// new kinds are a breaking change, by design, since callers are expected to
/// match exhaustively on the few ways this crate can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmptyArgv,
    InvalidStdio,
    InvalidPipeline,
    PipeFailed,
    SpawnFailed,
    WaitFailed,
    ReadFailed,
    WriteFailed,
    OpenFailed,
    CloseFailed,
    DupFailed,
    ChdirFailed,
    KillFailed,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::EmptyArgv => "empty argv",
            ErrorKind::InvalidStdio => "invalid stdio configuration",
            ErrorKind::InvalidPipeline => "invalid pipeline",
            ErrorKind::PipeFailed => "pipe creation failed",
            ErrorKind::SpawnFailed => "spawn failed",
            ErrorKind::WaitFailed => "wait failed",
            ErrorKind::ReadFailed => "read failed",
            ErrorKind::WriteFailed => "write failed",
            ErrorKind::OpenFailed => "open failed",
            ErrorKind::CloseFailed => "close failed",
            ErrorKind::DupFailed => "dup failed",
            ErrorKind::ChdirFailed => "chdir failed",
            ErrorKind::KillFailed => "kill failed",
            ErrorKind::Timeout => "timed out",
        };
        f.write_str(s)
    }
}

/// An error from this crate: a [`ErrorKind`] plus free-form context and,
/// where applicable, the OS errno that caused it.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {context}{}", .errno.map(|e| format!(" (errno {e})")).unwrap_or_default())]
pub struct Error {
    kind: ErrorKind,
    context: String,
    errno: Option<i32>,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
            errno: None,
        }
    }

    pub fn from_errno(kind: ErrorKind, context: impl Into<String>, errno: i32) -> Self {
        Error {
            kind,
            context: context.into(),
            errno: Some(errno),
        }
    }

    /// Builds an error from the current value of `errno`, as read immediately
    /// after a failing libc call.
    pub fn from_last_os_error(kind: ErrorKind, context: impl Into<String>) -> Self {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Error::from_errno(kind, context, errno)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn errno(&self) -> Option<i32> {
        self.errno
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err.errno {
            Some(code) => io::Error::from_raw_os_error(code),
            None => io::Error::other(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_errno_when_present() {
        let err = Error::from_errno(ErrorKind::SpawnFailed, "exec failed", 2);
        let s = err.to_string();
        assert!(s.contains("spawn failed"));
        assert!(s.contains("exec failed"));
        assert!(s.contains("errno 2"));
    }

    #[test]
    fn display_omits_errno_when_absent() {
        let err = Error::new(ErrorKind::EmptyArgv, "argv must not be empty");
        let s = err.to_string();
        assert!(!s.contains("errno"));
    }
}

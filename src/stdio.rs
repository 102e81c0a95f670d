//! User-facing selection of how a child's standard stream is wired.

use std::path::PathBuf;

/// How a file opened via [`Stdio::file`] is to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    WriteTruncate,
    WriteAppend,
    ReadWrite,
}

impl OpenMode {
    pub(crate) fn readable(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    pub(crate) fn writable(self) -> bool {
        matches!(
            self,
            OpenMode::WriteTruncate | OpenMode::WriteAppend | OpenMode::ReadWrite
        )
    }
}

/// How a single standard stream of a child process should be connected.
#[derive(Debug, Clone)]
pub enum Stdio {
    /// Share the parent's stream.
    Inherit,
    /// Connect to `/dev/null`.
    Null,
    /// Create a pipe; the parent keeps the other end.
    Piped,
    /// Use an existing, already-open file descriptor.
    Fd(i32),
    /// Open a path with the given mode (and, on creation, permission bits).
    File {
        path: PathBuf,
        mode: OpenMode,
        perms: Option<u32>,
    },
}

impl Stdio {
    pub fn inherit() -> Stdio {
        Stdio::Inherit
    }

    pub fn null() -> Stdio {
        Stdio::Null
    }

    pub fn piped() -> Stdio {
        Stdio::Piped
    }

    pub fn fd(fd: i32) -> Stdio {
        Stdio::Fd(fd)
    }

    pub fn file(path: impl Into<PathBuf>) -> Stdio {
        Stdio::File {
            path: path.into(),
            mode: OpenMode::ReadWrite,
            perms: None,
        }
    }

    pub fn file_with_mode(path: impl Into<PathBuf>, mode: OpenMode) -> Stdio {
        Stdio::File {
            path: path.into(),
            mode,
            perms: None,
        }
    }

    pub fn file_with_perms(path: impl Into<PathBuf>, mode: OpenMode, perms: u32) -> Stdio {
        Stdio::File {
            path: path.into(),
            mode,
            perms: Some(perms),
        }
    }
}

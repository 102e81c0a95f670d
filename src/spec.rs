//! The fully-resolved, validated spawn specification produced by lowering
//! (see `lowering.rs`). Nothing in this module performs a syscall.

use std::path::PathBuf;

use crate::stdio::OpenMode;

/// A resolved stdio connection. Unlike [`crate::stdio::Stdio`], this is an
/// internal type that additionally allows `DupStdout`, which only the
/// lowering step can produce (from `merge_stderr_into_stdout`).
#[derive(Debug, Clone)]
pub(crate) enum StdioSpec {
    Inherit,
    Null,
    Piped,
    Fd(i32),
    File {
        path: PathBuf,
        mode: OpenMode,
        perms: Option<u32>,
    },
    /// Valid only in the stderr slot: duplicate whatever stdout resolves to.
    DupStdout,
}

impl From<crate::stdio::Stdio> for StdioSpec {
    fn from(s: crate::stdio::Stdio) -> StdioSpec {
        match s {
            crate::stdio::Stdio::Inherit => StdioSpec::Inherit,
            crate::stdio::Stdio::Null => StdioSpec::Null,
            crate::stdio::Stdio::Piped => StdioSpec::Piped,
            crate::stdio::Stdio::Fd(fd) => StdioSpec::Fd(fd),
            crate::stdio::Stdio::File { path, mode, perms } => {
                StdioSpec::File { path, mode, perms }
            }
        }
    }
}

/// A fully resolved, validated description of a single process to spawn.
#[derive(Debug, Clone)]
pub(crate) struct SpawnSpec {
    pub argv: Vec<Vec<u8>>,
    pub cwd: Option<PathBuf>,
    /// `KEY=VALUE` pairs, sorted lexicographically for determinism.
    pub envp: Vec<Vec<u8>>,
    pub stdin: StdioSpec,
    pub stdout: StdioSpec,
    pub stderr: StdioSpec,
    /// Process group to join; `Some(0)` means "become a new group leader",
    /// `Some(pgid)` means "join an existing group". `None` means stay in
    /// the parent's group. Any `Some(_)` also means signals should target
    /// the whole group rather than just this pid (see `Child::terminate`).
    pub process_group: Option<libc::pid_t>,
}

/// A fully resolved pipeline: one [`SpawnSpec`] per stage, already wired
/// with inter-stage pipe overrides by `lowering::lower_pipeline`.
#[derive(Debug, Clone)]
pub(crate) struct PipelineSpec {
    pub stages: Vec<SpawnSpec>,
    pub pipefail: bool,
    pub new_process_group: bool,
}

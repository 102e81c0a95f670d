//! Platform backend: realizes a [`crate::spec::SpawnSpec`] as a live child
//! process. POSIX is the only backend implemented (§1: Windows is out of
//! scope for this crate).

pub(crate) mod posix;
pub(crate) mod posix_sys;

use crate::fd::OwnedFd;

/// A freshly spawned child, as handed back by the backend to the builder
/// layer (`command.rs`/`pipeline_child.rs`), which wraps it in a `Child`.
pub(crate) struct Spawned {
    pub pid: libc::pid_t,
    /// `Some` only when the spec requested a new process group; holds the
    /// group's pgid (equal to the leader's pid).
    pub pgid: Option<libc::pid_t>,
    pub stdin: Option<OwnedFd>,
    pub stdout: Option<OwnedFd>,
    pub stderr: Option<OwnedFd>,
}

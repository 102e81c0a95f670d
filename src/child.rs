//! A running (or just-finished) child process handle (§4.3 / §6).

use crate::backend::posix;
use crate::backend::Spawned;
use crate::clock::SystemClock;
use crate::error::Result;
use crate::fd::OwnedFd;
use crate::pipe::{PipeReader, PipeWriter};
use crate::status::ExitStatus;
use crate::wait::{wait_with_policy, WaitOptions, WaitOps};

/// A spawned process.
///
/// Dropping a `Child` that hasn't been waited on reaps it synchronously
/// (closing any un-taken pipe ends first, so the child can actually finish
/// writing or observe EOF on its stdin).
pub struct Child {
    pid: libc::pid_t,
    pgid: Option<libc::pid_t>,
    new_process_group: bool,
    stdin: Option<OwnedFd>,
    stdout: Option<OwnedFd>,
    stderr: Option<OwnedFd>,
    reaped: bool,
}

impl Child {
    pub(crate) fn new(spawned: Spawned, new_process_group: bool) -> Child {
        Child {
            pid: spawned.pid,
            pgid: spawned.pgid,
            new_process_group,
            stdin: spawned.stdin,
            stdout: spawned.stdout,
            stderr: spawned.stderr,
            reaped: false,
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Takes the write end of the child's stdin, if it was piped.
    pub fn take_stdin(&mut self) -> Option<PipeWriter> {
        self.stdin.take().map(PipeWriter::new)
    }

    /// Takes the read end of the child's stdout, if it was piped.
    pub fn take_stdout(&mut self) -> Option<PipeReader> {
        self.stdout.take().map(PipeReader::new)
    }

    /// Takes the read end of the child's stderr, if it was piped.
    pub fn take_stderr(&mut self) -> Option<PipeReader> {
        self.stderr.take().map(PipeReader::new)
    }

    /// Polls for completion without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        let status = WaitOps::try_wait(self)?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    /// Waits according to `options`, escalating to terminate/kill on timeout.
    pub fn wait(&mut self, options: WaitOptions) -> Result<ExitStatus> {
        let result = wait_with_policy(self, &SystemClock, options);
        self.reaped = true;
        result
    }

    /// Sends `SIGTERM` (to the process group if one was requested).
    pub fn terminate(&self) -> Result<()> {
        WaitOps::terminate(self)
    }

    /// Sends `SIGKILL` (to the process group if one was requested).
    pub fn kill(&self) -> Result<()> {
        WaitOps::kill(self)
    }

    /// Sends an arbitrary signal to the child (or its process group).
    pub fn signal(&self, signal: i32) -> Result<()> {
        posix::send_signal(self.pid, self.pgid, self.new_process_group, signal)
    }
}

impl WaitOps for Child {
    fn try_wait(&self) -> Result<Option<ExitStatus>> {
        posix::try_wait(self.pid)
    }

    fn wait_blocking(&self) -> Result<ExitStatus> {
        posix::wait_blocking(self.pid)
    }

    fn terminate(&self) -> Result<()> {
        posix::send_signal(self.pid, self.pgid, self.new_process_group, libc::SIGTERM)
    }

    fn kill(&self) -> Result<()> {
        posix::send_signal(self.pid, self.pgid, self.new_process_group, libc::SIGKILL)
    }
}

impl Drop for Child {
    fn drop(&mut self) {
        // Drop the pipe ends before reaping: a child blocked writing to a
        // full stdout pipe, or reading from stdin, needs EOF/EPIPE to make
        // progress toward exit.
        self.stdin.take();
        self.stdout.take();
        self.stderr.take();
        if !self.reaped {
            let _ = posix::wait_blocking(self.pid);
        }
    }
}

//! Thin, directly-testable wrappers around the raw POSIX calls the backend
//! needs. Nothing here does more than one syscall's worth of work; the
//! policy (ordering, retry, error translation) lives in `posix.rs`.

use std::ffi::CString;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use crate::error::{Error, ErrorKind, Result};
use crate::fd::OwnedFd;

pub const WNOHANG: i32 = libc::WNOHANG;
pub const SIGTERM: i32 = libc::SIGTERM;
pub const SIGKILL: i32 = libc::SIGKILL;
pub use libc::ECHILD;

fn last_err(kind: ErrorKind, context: &str) -> Error {
    Error::from_last_os_error(kind, context)
}

/// Creates an anonymous pipe; both ends are close-on-exec.
pub fn pipe() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(last_err(ErrorKind::PipeFailed, "pipe2"));
    }
    Ok(unsafe { (OwnedFd::from_raw(fds[0]), OwnedFd::from_raw(fds[1])) })
}

/// `fork(2)`. Returns `0` in the child, the child's pid in the parent.
///
/// # Safety
/// The caller must do only async-signal-safe work between this call and
/// `execve`/`_exit` in the child branch.
pub unsafe fn fork() -> Result<libc::pid_t> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(last_err(ErrorKind::SpawnFailed, "fork"));
    }
    Ok(pid)
}

pub fn cstring(s: &[u8]) -> Result<CString> {
    CString::new(s).map_err(|_| Error::new(ErrorKind::SpawnFailed, "argument contains a NUL byte"))
}

/// `execve(2)`. Never returns on success.
pub fn execve(path: &CString, argv: &[CString], envp: &[CString]) -> std::io::Error {
    let mut argv_ptrs: Vec<*const libc::c_char> =
        argv.iter().map(|s| s.as_ptr()).chain(std::iter::once(ptr::null())).collect();
    let mut envp_ptrs: Vec<*const libc::c_char> =
        envp.iter().map(|s| s.as_ptr()).chain(std::iter::once(ptr::null())).collect();
    unsafe {
        libc::execve(path.as_ptr(), argv_ptrs.as_mut_ptr(), envp_ptrs.as_mut_ptr());
    }
    std::io::Error::last_os_error()
}

/// `_exit(2)`: terminates immediately, skipping destructors and atexit
/// handlers. Used only in the post-fork, pre-exec child branch.
pub fn exit_now(code: i32) -> ! {
    unsafe { libc::_exit(code) }
}

pub fn waitpid(pid: libc::pid_t, flags: i32) -> Result<(libc::pid_t, i32)> {
    let mut status: libc::c_int = 0;
    let got = unsafe { libc::waitpid(pid, &mut status, flags) };
    if got < 0 {
        return Err(last_err(ErrorKind::WaitFailed, "waitpid"));
    }
    Ok((got, status))
}

pub fn kill(pid: libc::pid_t, signal: i32) -> Result<()> {
    if unsafe { libc::kill(pid, signal) } < 0 {
        return Err(last_err(ErrorKind::KillFailed, "kill"));
    }
    Ok(())
}

/// Sends `signal` to the process group led by `pgid` (negative-pid kill
/// convention).
pub fn killpg(pgid: libc::pid_t, signal: i32) -> Result<()> {
    kill(-pgid, signal)
}

pub fn setpgid(pid: libc::pid_t, pgid: libc::pid_t) -> Result<()> {
    if unsafe { libc::setpgid(pid, pgid) } < 0 {
        return Err(last_err(ErrorKind::SpawnFailed, "setpgid"));
    }
    Ok(())
}

pub fn dup2(oldfd: i32, newfd: i32) -> Result<()> {
    if unsafe { libc::dup2(oldfd, newfd) } < 0 {
        return Err(last_err(ErrorKind::DupFailed, "dup2"));
    }
    Ok(())
}

pub fn chdir(path: &Path) -> Result<()> {
    let c = cstring(path.as_os_str().as_bytes())?;
    if unsafe { libc::chdir(c.as_ptr()) } < 0 {
        return Err(last_err(ErrorKind::ChdirFailed, "chdir"));
    }
    Ok(())
}

pub fn close(fd: i32) -> Result<()> {
    if unsafe { libc::close(fd) } < 0 {
        return Err(last_err(ErrorKind::CloseFailed, "close"));
    }
    Ok(())
}

/// Resets signal disposition the way `std::process::Command::do_exec` does:
/// libstd ignores SIGPIPE and may hold a custom signal mask; children must
/// not inherit that, or ordinary Unix programs get confused by a SIGPIPE
/// they can't see.
pub fn reset_sigpipe() -> Result<()> {
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        if libc::sigemptyset(set.as_mut_ptr()) < 0 {
            return Err(last_err(ErrorKind::SpawnFailed, "sigemptyset"));
        }
        let set = set.assume_init();
        if libc::pthread_sigmask(libc::SIG_SETMASK, &set, ptr::null_mut()) != 0 {
            return Err(last_err(ErrorKind::SpawnFailed, "pthread_sigmask"));
        }
        if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
            return Err(last_err(ErrorKind::SpawnFailed, "signal(SIGPIPE, SIG_DFL)"));
        }
    }
    Ok(())
}

pub const POLLIN: i16 = libc::POLLIN;
pub const POLLOUT: i16 = libc::POLLOUT;
pub const POLLHUP: i16 = libc::POLLHUP;
pub const POLLERR: i16 = libc::POLLERR;
pub const POLLNVAL: i16 = libc::POLLNVAL;

/// One entry of a `poll(2)` call.
pub struct PollFd(libc::pollfd);

impl PollFd {
    pub fn new(fd: Option<i32>, events: i16) -> PollFd {
        PollFd(libc::pollfd {
            fd: fd.unwrap_or(-1),
            events,
            revents: 0,
        })
    }

    pub fn test(&self, mask: i16) -> bool {
        self.0.revents & mask != 0
    }
}

/// `poll(2)` with a timeout in milliseconds (`-1` blocks indefinitely).
pub fn poll(fds: &mut [PollFd], timeout_ms: i32) -> Result<usize> {
    let n = unsafe {
        libc::poll(
            fds.as_mut_ptr() as *mut libc::pollfd,
            fds.len() as libc::nfds_t,
            timeout_ms,
        )
    };
    if n < 0 {
        return Err(last_err(ErrorKind::ReadFailed, "poll"));
    }
    Ok(n as usize)
}

/// Sets a file descriptor non-blocking (`O_NONBLOCK`), used exclusively by
/// the output drainer.
pub fn set_nonblocking(fd: i32) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(last_err(ErrorKind::ReadFailed, "fcntl(F_GETFL)"));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(last_err(ErrorKind::ReadFailed, "fcntl(F_SETFL)"));
    }
    Ok(())
}

pub fn getpid() -> libc::pid_t {
    unsafe { libc::getpid() }
}

/// The highest fd the process may currently have open, per `RLIMIT_NOFILE`.
/// Computed in the parent and handed to the forked child so it never needs
/// to call `sysconf`/`getrlimit` itself after fork.
pub fn open_fd_upper_bound() -> libc::c_int {
    let mut lim = MaybeUninit::<libc::rlimit>::uninit();
    let got = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, lim.as_mut_ptr()) };
    if got < 0 {
        return 1024;
    }
    let lim = unsafe { lim.assume_init() };
    if lim.rlim_cur == libc::RLIM_INFINITY || lim.rlim_cur > i32::MAX as libc::rlim_t {
        65536
    } else {
        lim.rlim_cur as libc::c_int
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_round_trips() {
        let (r, w) = pipe().unwrap();
        assert_ne!(r.raw(), w.raw());
    }

    #[test]
    fn waitpid_on_true_reports_success() {
        let c = cstring(b"/bin/true").unwrap();
        let argv = vec![c.clone()];
        let pid = unsafe { fork() }.unwrap();
        if pid == 0 {
            let envp: Vec<CString> = vec![];
            execve(&c, &argv, &envp);
            exit_now(127);
        }
        let (got, status) = waitpid(pid, 0).unwrap();
        assert_eq!(got, pid);
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), 0);
    }
}

//! The POSIX backend: strategy selection between the `posix_spawn` fast
//! path and the fork/exec fallback, plus the wait/terminate/kill/signal
//! operations shared by both.
//!
//! See the design notes for the full protocol; this file follows it step
//! for step rather than introducing its own structure.

use std::collections::HashSet;
use std::ffi::CString;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;

use crate::child::Child;
use crate::config::force_fallback;
use crate::error::{Error, ErrorKind, Result};
use crate::fd::OwnedFd;
use crate::spec::{SpawnSpec, StdioSpec};
use crate::status::ExitStatus;
use crate::stdio::OpenMode;

use super::posix_sys as sys;
use super::Spawned;

enum Strategy {
    FastPath,
    Fallback,
}

fn choose_strategy(spec: &SpawnSpec) -> Strategy {
    if force_fallback() {
        return Strategy::Fallback;
    }
    if spec.cwd.is_some() {
        // posix_spawn can only change the child's working directory via the
        // glibc addchdir_np extension, which this crate does not bind; fall
        // back rather than silently spawn in the wrong directory.
        return Strategy::Fallback;
    }
    Strategy::FastPath
}

pub(crate) fn spawn_command(spec: SpawnSpec) -> Result<Child> {
    let span = tracing::debug_span!("spawn", argv0 = ?String::from_utf8_lossy(&spec.argv[0]));
    let _enter = span.enter();
    let new_pg = spec.process_group.is_some();
    let spawned = spawn_stage(spec)?;
    tracing::debug!(pid = spawned.pid, "spawned");
    Ok(Child::new(spawned, new_pg))
}

/// Spawns one stage of a pipeline, or a standalone command, returning the
/// raw backend handle rather than a `Child` — the pipeline composition
/// layer needs the bare `Spawned` to assemble `PipelineChild`.
pub(crate) fn spawn_stage(spec: SpawnSpec) -> Result<Spawned> {
    match choose_strategy(&spec) {
        Strategy::FastPath => {
            tracing::debug!(strategy = "fast_path");
            spawn_fast_path(&spec)
        }
        Strategy::Fallback => {
            tracing::debug!(strategy = "fallback");
            spawn_fallback(&spec)
        }
    }
}

// ---------------------------------------------------------------------
// Shared stdio planning
// ---------------------------------------------------------------------

/// What the child should end up with for one of its three standard streams.
enum StdioPlan {
    Inherit,
    Open { path: CString, flags: i32, mode: u32 },
    /// Duplicate an existing fd onto the target, then close the source.
    DupFrom(i32),
    /// Valid only for stderr: `dup2(1, 2)`, applied after stdout is set up.
    DupStdout,
}

struct PreparedStream {
    /// Parent-side end of a pipe, handed back in `Spawned` for `Piped`.
    parent_end: Option<OwnedFd>,
    /// Owns a just-created child-side fd (pipe end or opened file) until the
    /// spawn completes, so it isn't leaked if an earlier step fails.
    child_owned: Option<OwnedFd>,
    plan: StdioPlan,
}

fn open_flags(mode: OpenMode) -> i32 {
    match mode {
        OpenMode::Read => libc::O_RDONLY,
        OpenMode::WriteTruncate => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
        OpenMode::WriteAppend => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
        OpenMode::ReadWrite => libc::O_RDWR | libc::O_CREAT,
    }
}

fn prepare_stream(spec: &StdioSpec, is_input: bool) -> Result<PreparedStream> {
    match spec {
        StdioSpec::Inherit => Ok(PreparedStream { parent_end: None, child_owned: None, plan: StdioPlan::Inherit }),
        StdioSpec::Null => {
            let path = sys::cstring(b"/dev/null")?;
            let flags = if is_input { libc::O_RDONLY } else { libc::O_WRONLY };
            Ok(PreparedStream { parent_end: None, child_owned: None, plan: StdioPlan::Open { path, flags, mode: 0o666 } })
        }
        StdioSpec::File { path, mode, perms } => {
            let c_path = sys::cstring(path.as_os_str().as_bytes())?;
            Ok(PreparedStream {
                parent_end: None,
                child_owned: None,
                plan: StdioPlan::Open { path: c_path, flags: open_flags(*mode), mode: perms.unwrap_or(0o666) },
            })
        }
        StdioSpec::Fd(fd) => Ok(PreparedStream { parent_end: None, child_owned: None, plan: StdioPlan::DupFrom(*fd) }),
        StdioSpec::Piped => {
            let (read, write) = sys::pipe()?;
            let (parent_end, child_end) = if is_input { (write, read) } else { (read, write) };
            let child_fd = child_end.raw();
            Ok(PreparedStream { parent_end: Some(parent_end), child_owned: Some(child_end), plan: StdioPlan::DupFrom(child_fd) })
        }
        StdioSpec::DupStdout => Ok(PreparedStream { parent_end: None, child_owned: None, plan: StdioPlan::DupStdout }),
    }
}

struct PreparedStdio {
    stdin: PreparedStream,
    stdout: PreparedStream,
    stderr: PreparedStream,
}

fn prepare_stdio(spec: &SpawnSpec) -> Result<PreparedStdio> {
    Ok(PreparedStdio {
        stdin: prepare_stream(&spec.stdin, true)?,
        stdout: prepare_stream(&spec.stdout, false)?,
        stderr: prepare_stream(&spec.stderr, false)?,
    })
}

fn resolve_program_path(argv0: &[u8], cwd: Option<&Path>) -> Result<CString> {
    if argv0.contains(&b'/') {
        let path: PathBuf = if let Some(cwd) = cwd {
            cwd.join(std::str::from_utf8(argv0).unwrap_or_default())
        } else {
            PathBuf::from(std::ffi::OsStr::from_bytes(argv0))
        };
        return sys::cstring(path.as_os_str().as_bytes());
    }
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(std::ffi::OsStr::from_bytes(argv0));
        let c_candidate = sys::cstring(candidate.as_os_str().as_bytes())?;
        if unsafe { libc::access(c_candidate.as_ptr(), libc::X_OK) } == 0 {
            return Ok(c_candidate);
        }
    }
    Err(Error::new(ErrorKind::SpawnFailed, format!(
        "{}: command not found in PATH",
        String::from_utf8_lossy(argv0)
    )))
}

fn cstrings(items: &[Vec<u8>]) -> Result<Vec<CString>> {
    items.iter().map(|b| sys::cstring(b)).collect()
}

// ---------------------------------------------------------------------
// Fallback path: fork + manual setup + exec
// ---------------------------------------------------------------------

fn spawn_fallback(spec: &SpawnSpec) -> Result<Spawned> {
    let prepared = prepare_stdio(spec)?;
    let program = resolve_program_path(&spec.argv[0], spec.cwd.as_deref())?;
    let argv = cstrings(&spec.argv)?;
    let envp = cstrings(&spec.envp)?;
    let cwd = spec.cwd.clone();
    let pgid_request = spec.process_group;
    let close_bound = sys::open_fd_upper_bound();

    let (err_read, err_write) = sys::pipe()?;

    // SAFETY: only async-signal-safe calls happen in the child branch below,
    // between `fork` and `execve`/`_exit`.
    let pid = unsafe { sys::fork()? };

    if pid == 0 {
        drop(err_read);
        let err_write_fd = err_write.raw();
        let outcome = child_after_fork(&prepared, cwd.as_deref(), pgid_request, &program, &argv, &envp, close_bound, err_write_fd);
        // child_after_fork only returns on failure.
        let errno = outcome.raw_os_error().unwrap_or(0);
        let bytes = errno.to_ne_bytes();
        unsafe {
            libc::write(err_write_fd, bytes.as_ptr() as *const libc::c_void, bytes.len());
        }
        sys::exit_now(127);
    }

    drop(err_write);
    // Parent owns both ends until here; the child's copy of err_write stays
    // open in the child until exec succeeds (it's not cloexec) or the child
    // writes to it and exits.
    let mut err_read = err_read;
    let mut buf = [0u8; 4];
    let n = read_exact_or_eof(&mut err_read, &mut buf)?;
    drop(err_read);

    match n {
        0 => {
            // EOF: exec succeeded.
            let pgid = resolve_pgid(pid, pgid_request);
            Ok(Spawned {
                pid,
                pgid,
                stdin: prepared.stdin.parent_end,
                stdout: prepared.stdout.parent_end,
                stderr: prepared.stderr.parent_end,
            })
        }
        4 => {
            let errno = i32::from_ne_bytes(buf);
            let _ = sys::waitpid(pid, 0);
            Err(Error::from_errno(ErrorKind::SpawnFailed, "child setup or exec failed", errno))
        }
        _ => Err(Error::new(ErrorKind::ReadFailed, "short read on spawn error pipe")),
    }
}

fn resolve_pgid(pid: libc::pid_t, pgid_request: Option<libc::pid_t>) -> Option<libc::pid_t> {
    match pgid_request {
        Some(0) => Some(pid),
        Some(existing) => Some(existing),
        None => None,
    }
}

/// Reads up to `buf.len()` bytes, distinguishing "closed before any byte"
/// (returns 0) from "got exactly `buf.len()` bytes" (returns that length).
/// Any other outcome is a protocol error.
fn read_exact_or_eof(fd: &mut OwnedFd, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    loop {
        let n = unsafe {
            libc::read(fd.raw(), buf[total..].as_mut_ptr() as *mut libc::c_void, buf.len() - total)
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::from_errno(ErrorKind::ReadFailed, "read spawn error pipe", err.raw_os_error().unwrap_or(0)));
        }
        if n == 0 {
            return Ok(total);
        }
        total += n as usize;
        if total == buf.len() {
            return Ok(total);
        }
    }
}

/// Everything that runs in the child between `fork` and `execve`. Returns
/// only on failure, with the `io::Error` to report to the parent.
fn child_after_fork(
    prepared: &PreparedStdio,
    cwd: Option<&Path>,
    pgid_request: Option<libc::pid_t>,
    program: &CString,
    argv: &[CString],
    envp: &[CString],
    close_bound: libc::c_int,
    err_write_fd: i32,
) -> std::io::Error {
    macro_rules! tri {
        ($e:expr) => {
            match $e {
                Ok(v) => v,
                Err(e) => return io_error_from(e),
            }
        };
    }

    if let Some(pgid) = pgid_request {
        tri!(sys::setpgid(0, pgid));
    }
    if let Some(dir) = cwd {
        tri!(sys::chdir(dir));
    }

    tri!(apply_stream(&prepared.stdin, 0));
    tri!(apply_stream(&prepared.stdout, 1));
    tri!(apply_stream(&prepared.stderr, 2));

    close_other_fds(close_bound, err_write_fd);

    tri!(sys::reset_sigpipe());

    sys::execve(program, argv, envp)
}

fn io_error_from(e: Error) -> std::io::Error {
    std::io::Error::from_raw_os_error(e.errno().unwrap_or(libc::EIO))
}

fn apply_stream(stream: &PreparedStream, target: i32) -> Result<()> {
    match &stream.plan {
        StdioPlan::Inherit => Ok(()),
        StdioPlan::Open { path, flags, mode } => {
            let fd = unsafe { libc::open(path.as_ptr(), *flags, *mode as libc::c_uint) };
            if fd < 0 {
                return Err(Error::from_last_os_error(ErrorKind::OpenFailed, "open"));
            }
            if fd != target {
                sys::dup2(fd, target)?;
                let _ = sys::close(fd);
            }
            Ok(())
        }
        StdioPlan::DupFrom(source) => {
            if *source != target {
                sys::dup2(*source, target)?;
                let _ = sys::close(*source);
            }
            Ok(())
        }
        StdioPlan::DupStdout => sys::dup2(1, target),
    }
}

/// Closes every fd in `3..close_bound` except `keep`, best-effort. This
/// races against other threads opening fds between preparation and fork;
/// see the design notes' open question on this.
fn close_other_fds(close_bound: libc::c_int, keep: i32) {
    for fd in 3..close_bound {
        if fd == keep {
            continue;
        }
        unsafe {
            libc::close(fd);
        }
    }
}

// ---------------------------------------------------------------------
// Fast path: posix_spawn with file actions + attributes
// ---------------------------------------------------------------------

struct SpawnFileActions(libc::posix_spawn_file_actions_t);

impl SpawnFileActions {
    fn new() -> Result<SpawnFileActions> {
        let mut actions = MaybeUninit::uninit();
        if unsafe { libc::posix_spawn_file_actions_init(actions.as_mut_ptr()) } != 0 {
            return Err(Error::new(ErrorKind::SpawnFailed, "posix_spawn_file_actions_init"));
        }
        Ok(SpawnFileActions(unsafe { actions.assume_init() }))
    }

    fn add_open(&mut self, target: i32, path: &CString, flags: i32, mode: u32) -> Result<()> {
        let rc = unsafe {
            libc::posix_spawn_file_actions_addopen(&mut self.0, target, path.as_ptr(), flags, mode as libc::mode_t)
        };
        if rc != 0 {
            return Err(Error::from_errno(ErrorKind::SpawnFailed, "posix_spawn_file_actions_addopen", rc));
        }
        Ok(())
    }

    fn add_dup2(&mut self, source: i32, target: i32) -> Result<()> {
        let rc = unsafe { libc::posix_spawn_file_actions_adddup2(&mut self.0, source, target) };
        if rc != 0 {
            return Err(Error::from_errno(ErrorKind::SpawnFailed, "posix_spawn_file_actions_adddup2", rc));
        }
        Ok(())
    }

    fn add_close(&mut self, fd: i32) -> Result<()> {
        let rc = unsafe { libc::posix_spawn_file_actions_addclose(&mut self.0, fd) };
        if rc != 0 {
            return Err(Error::from_errno(ErrorKind::SpawnFailed, "posix_spawn_file_actions_addclose", rc));
        }
        Ok(())
    }

    fn as_ptr(&self) -> *const libc::posix_spawn_file_actions_t {
        &self.0
    }
}

impl Drop for SpawnFileActions {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawn_file_actions_destroy(&mut self.0);
        }
    }
}

struct SpawnAttr(libc::posix_spawnattr_t);

impl SpawnAttr {
    fn new() -> Result<SpawnAttr> {
        let mut attr = MaybeUninit::uninit();
        if unsafe { libc::posix_spawnattr_init(attr.as_mut_ptr()) } != 0 {
            return Err(Error::new(ErrorKind::SpawnFailed, "posix_spawnattr_init"));
        }
        Ok(SpawnAttr(unsafe { attr.assume_init() }))
    }

    fn set_pgroup(&mut self, pgid: libc::pid_t) -> Result<()> {
        let rc = unsafe { libc::posix_spawnattr_setflags(&mut self.0, libc::POSIX_SPAWN_SETPGROUP as i16) };
        if rc != 0 {
            return Err(Error::from_errno(ErrorKind::SpawnFailed, "posix_spawnattr_setflags", rc));
        }
        let rc = unsafe { libc::posix_spawnattr_setpgroup(&mut self.0, pgid) };
        if rc != 0 {
            return Err(Error::from_errno(ErrorKind::SpawnFailed, "posix_spawnattr_setpgroup", rc));
        }
        Ok(())
    }

    fn as_ptr(&self) -> *const libc::posix_spawnattr_t {
        &self.0
    }
}

impl Drop for SpawnAttr {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawnattr_destroy(&mut self.0);
        }
    }
}

fn add_stream_actions(actions: &mut SpawnFileActions, stream: &StdioPlan, target: i32) -> Result<()> {
    match stream {
        StdioPlan::Inherit => Ok(()),
        StdioPlan::Open { path, flags, mode } => actions.add_open(target, path, *flags, *mode),
        StdioPlan::DupFrom(source) => {
            if *source == target {
                return Ok(());
            }
            actions.add_dup2(*source, target)?;
            actions.add_close(*source)
        }
        StdioPlan::DupStdout => actions.add_dup2(1, target),
    }
}

fn spawn_fast_path(spec: &SpawnSpec) -> Result<Spawned> {
    let prepared = prepare_stdio(spec)?;
    let program = resolve_program_path(&spec.argv[0], None)?;
    let argv = cstrings(&spec.argv)?;
    let envp = cstrings(&spec.envp)?;

    let mut actions = SpawnFileActions::new()?;
    add_stream_actions(&mut actions, &prepared.stdin.plan, 0)?;
    add_stream_actions(&mut actions, &prepared.stdout.plan, 1)?;
    add_stream_actions(&mut actions, &prepared.stderr.plan, 2)?;

    // Best-effort close of other inherited fds: the fast path has no
    // "default cloexec" attribute bound for this libc version, so mirror
    // the fallback's enumerate-and-close behavior here too.
    let mut keep: HashSet<i32> = HashSet::from([0, 1, 2]);
    for stream in [&prepared.stdin, &prepared.stdout, &prepared.stderr] {
        if let Some(owned) = &stream.child_owned {
            keep.insert(owned.raw());
        }
        // A `DupFrom` source already gets its own addclose action above;
        // adding a second one for the same fd risks the action failing
        // because the fd is already gone by the time it runs.
        if let StdioPlan::DupFrom(source) = &stream.plan {
            keep.insert(*source);
        }
    }
    for fd in enumerate_open_fds() {
        if fd > 2 && !keep.contains(&fd) {
            actions.add_close(fd)?;
        }
    }

    let mut attr = SpawnAttr::new()?;
    let pgid_request = spec.process_group;
    if let Some(pgid) = pgid_request {
        attr.set_pgroup(pgid)?;
    }

    let mut argv_ptrs: Vec<*mut libc::c_char> =
        argv.iter().map(|s| s.as_ptr() as *mut libc::c_char).chain(std::iter::once(ptr::null_mut())).collect();
    let mut envp_ptrs: Vec<*mut libc::c_char> =
        envp.iter().map(|s| s.as_ptr() as *mut libc::c_char).chain(std::iter::once(ptr::null_mut())).collect();

    let mut pid: libc::pid_t = 0;
    let rc = unsafe {
        libc::posix_spawn(
            &mut pid,
            program.as_ptr(),
            actions.as_ptr(),
            attr.as_ptr(),
            argv_ptrs.as_mut_ptr(),
            envp_ptrs.as_mut_ptr(),
        )
    };
    if rc != 0 {
        return Err(Error::from_errno(ErrorKind::SpawnFailed, "posix_spawn", rc));
    }

    let pgid = resolve_pgid(pid, pgid_request);
    Ok(Spawned {
        pid,
        pgid,
        stdin: prepared.stdin.parent_end,
        stdout: prepared.stdout.parent_end,
        stderr: prepared.stderr.parent_end,
    })
}

fn enumerate_open_fds() -> Vec<i32> {
    let Ok(entries) = std::fs::read_dir("/proc/self/fd") else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse().ok()))
        .collect()
}

// ---------------------------------------------------------------------
// Wait / signal operations shared by both strategies
// ---------------------------------------------------------------------

pub(crate) fn try_wait(pid: libc::pid_t) -> Result<Option<ExitStatus>> {
    match sys::waitpid(pid, sys::WNOHANG) {
        Ok((got, status)) if got == pid => Ok(Some(ExitStatus::from_raw(status))),
        Ok(_) => Ok(None),
        Err(e) if e.errno() == Some(sys::ECHILD) => Ok(Some(ExitStatus::undetermined())),
        Err(e) => Err(e),
    }
}

pub(crate) fn wait_blocking(pid: libc::pid_t) -> Result<ExitStatus> {
    match sys::waitpid(pid, 0) {
        Ok((_, status)) => Ok(ExitStatus::from_raw(status)),
        Err(e) if e.errno() == Some(sys::ECHILD) => Ok(ExitStatus::undetermined()),
        Err(e) => Err(e),
    }
}

/// Sends `signal` to the child, or to its process group if `use_group` is
/// set and a pgid is known.
pub(crate) fn send_signal(pid: libc::pid_t, pgid: Option<libc::pid_t>, use_group: bool, signal: i32) -> Result<()> {
    match (use_group, pgid) {
        (true, Some(pgid)) => sys::killpg(pgid, signal),
        _ => sys::kill(pid, signal),
    }
}

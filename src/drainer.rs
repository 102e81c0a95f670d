//! Poll-based, non-blocking output draining (§4.3 "Output Drainer").
//!
//! Reading stdout and stderr with two blocking `read`s in sequence can
//! deadlock: if the child fills its stdout pipe while this process is
//! still blocked reading stderr, neither side makes progress. Polling both
//! fds together and reading only what's ready avoids that regardless of
//! how much either stream produces.

use crate::backend::posix_sys as sys;
use crate::child::Child;
use crate::config::DRAIN_CHUNK_SIZE;
use crate::error::Result;
use crate::output::Output;
use crate::pipe::PipeReader;
use crate::wait::WaitOptions;

struct Stream {
    label: &'static str,
    reader: PipeReader,
    buf: Vec<u8>,
    done: bool,
}

/// Drains the child's piped stdout/stderr to completion, then waits for it
/// to exit under `wait_options`.
pub(crate) fn drain_and_wait(mut child: Child, wait_options: WaitOptions) -> Result<Output> {
    let (stdout_buf, stderr_buf) = drain_two(child.take_stdout(), child.take_stderr())?;
    let status = child.wait(wait_options)?;
    Ok(Output::new(stdout_buf, stderr_buf, status))
}

/// Drains up to two piped streams concurrently to completion, returning
/// whatever each accumulated (empty if not piped).
pub(crate) fn drain_two(
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = stdout.map(|reader| Stream { label: "stdout", reader, buf: Vec::new(), done: false });
    let mut stderr = stderr.map(|reader| Stream { label: "stderr", reader, buf: Vec::new(), done: false });

    if let Some(s) = &stdout {
        sys::set_nonblocking(s.reader.fd().raw())?;
    }
    if let Some(s) = &stderr {
        sys::set_nonblocking(s.reader.fd().raw())?;
    }

    loop {
        let stdout_active = stdout.as_ref().is_some_and(|s| !s.done);
        let stderr_active = stderr.as_ref().is_some_and(|s| !s.done);
        if !stdout_active && !stderr_active {
            break;
        }

        let mut fds = Vec::with_capacity(2);
        if stdout_active {
            fds.push(sys::PollFd::new(Some(stdout.as_ref().unwrap().reader.fd().raw()), sys::POLLIN));
        }
        if stderr_active {
            fds.push(sys::PollFd::new(Some(stderr.as_ref().unwrap().reader.fd().raw()), sys::POLLIN));
        }

        sys::poll(&mut fds, -1)?;

        let mut idx = 0;
        if stdout_active {
            if fds[idx].test(sys::POLLIN | sys::POLLHUP | sys::POLLERR | sys::POLLNVAL) {
                drain_ready(stdout.as_mut().unwrap())?;
            }
            idx += 1;
        }
        if stderr_active && fds[idx].test(sys::POLLIN | sys::POLLHUP | sys::POLLERR | sys::POLLNVAL) {
            drain_ready(stderr.as_mut().unwrap())?;
        }
    }

    Ok((stdout.map(|s| s.buf).unwrap_or_default(), stderr.map(|s| s.buf).unwrap_or_default()))
}

/// Reads whatever is currently available, marking the stream done at EOF.
/// A non-blocking read with nothing available (`EAGAIN`) is not an error.
fn drain_ready(stream: &mut Stream) -> Result<()> {
    let mut chunk = vec![0u8; DRAIN_CHUNK_SIZE];
    loop {
        match stream.reader.read_some(&mut chunk) {
            Ok(0) => {
                stream.done = true;
                tracing::trace!(fd = stream.label, "drain complete");
                return Ok(());
            }
            Ok(n) => {
                stream.buf.extend_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    return Ok(());
                }
            }
            Err(e) if e.errno() == Some(libc::EAGAIN) || e.errno() == Some(libc::EWOULDBLOCK) => {
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

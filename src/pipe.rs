//! Byte-oriented ends of an anonymous pipe, built on [`OwnedFd`].

use std::io;

use crate::error::{Error, ErrorKind, Result};
use crate::fd::OwnedFd;

/// The readable end of a pipe.
#[derive(Debug)]
pub struct PipeReader(OwnedFd);

/// The writable end of a pipe.
#[derive(Debug)]
pub struct PipeWriter(OwnedFd);

impl PipeReader {
    pub(crate) fn new(fd: OwnedFd) -> PipeReader {
        PipeReader(fd)
    }

    pub fn fd(&self) -> &OwnedFd {
        &self.0
    }

    pub fn into_fd(self) -> OwnedFd {
        self.0
    }

    /// Reads into `buf`, retrying on `EINTR`. Returns `0` at EOF.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let n = unsafe {
                libc::read(
                    self.0.raw(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::from_errno(
                ErrorKind::ReadFailed,
                "read from pipe",
                err.raw_os_error().unwrap_or(0),
            ));
        }
    }

    /// Reads until EOF, appending to `out`.
    pub fn read_all(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read_some(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
}

impl PipeWriter {
    pub(crate) fn new(fd: OwnedFd) -> PipeWriter {
        PipeWriter(fd)
    }

    pub fn fd(&self) -> &OwnedFd {
        &self.0
    }

    pub fn into_fd(self) -> OwnedFd {
        self.0
    }

    /// Writes some prefix of `buf`, retrying on `EINTR`. Returns the number
    /// of bytes actually written (may be less than `buf.len()`).
    pub fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            let n = unsafe {
                libc::write(self.0.raw(), buf.as_ptr() as *const libc::c_void, buf.len())
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::from_errno(
                ErrorKind::WriteFailed,
                "write to pipe",
                err.raw_os_error().unwrap_or(0),
            ));
        }
    }

    /// Writes all of `buf`, looping until it is fully consumed.
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write_some(buf)?;
            if n == 0 {
                return Err(Error::new(ErrorKind::WriteFailed, "partial write returned 0"));
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_pipe() {
        let (mut r, mut w) = crate::backend::posix_sys::pipe()
            .map(|(rfd, wfd)| (PipeReader::new(rfd), PipeWriter::new(wfd)))
            .unwrap();
        w.write_all(b"hello").unwrap();
        drop(w);
        let mut out = Vec::new();
        r.read_all(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }
}

//! An owned, move-only file descriptor that closes itself on every exit path.

use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

use crate::error::{Error, ErrorKind, Result};

/// A file descriptor owned by exactly one value at a time.
///
/// Closing is guaranteed on drop. There is no way to obtain two `OwnedFd`s
/// for the same descriptor; use [`OwnedFd::try_clone`] to `dup` a new one.
#[derive(Debug)]
pub struct OwnedFd(RawFd);

impl OwnedFd {
    /// Takes ownership of `fd`.
    ///
    /// # Safety
    /// `fd` must be a valid, open file descriptor not owned by anything else.
    pub unsafe fn from_raw(fd: RawFd) -> OwnedFd {
        OwnedFd(fd)
    }

    pub fn raw(&self) -> RawFd {
        self.0
    }

    /// Releases ownership without closing, returning the raw descriptor.
    pub fn into_raw(self) -> RawFd {
        let fd = self.0;
        std::mem::forget(self);
        fd
    }

    /// Duplicates the descriptor with `dup(2)`; the clone is close-on-exec.
    pub fn try_clone(&self) -> Result<OwnedFd> {
        let new = unsafe { libc::fcntl(self.0, libc::F_DUPFD_CLOEXEC, 0) };
        if new < 0 {
            return Err(Error::from_last_os_error(ErrorKind::DupFailed, "dup"));
        }
        Ok(OwnedFd(new))
    }

    /// Sets or clears the close-on-exec flag.
    pub fn set_cloexec(&self, cloexec: bool) -> Result<()> {
        set_cloexec(self.0, cloexec)
    }
}

pub(crate) fn set_cloexec(fd: RawFd, cloexec: bool) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(Error::from_last_os_error(ErrorKind::DupFailed, "fcntl(F_GETFD)"));
    }
    let new_flags = if cloexec {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    if new_flags != flags && unsafe { libc::fcntl(fd, libc::F_SETFD, new_flags) } < 0 {
        return Err(Error::from_last_os_error(ErrorKind::DupFailed, "fcntl(F_SETFD)"));
    }
    Ok(())
}

impl AsRawFd for OwnedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl FromRawFd for OwnedFd {
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        unsafe { OwnedFd::from_raw(fd) }
    }
}

impl IntoRawFd for OwnedFd {
    fn into_raw_fd(self) -> RawFd {
        self.into_raw()
    }
}

impl Drop for OwnedFd {
    fn drop(&mut self) {
        if self.0 >= 0 {
            unsafe {
                libc::close(self.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dup_produces_independent_fd() {
        let (r, w) = crate::backend::posix_sys::pipe().unwrap();
        let r2 = r.try_clone().unwrap();
        assert_ne!(r.raw(), r2.raw());
        drop(w);
    }
}

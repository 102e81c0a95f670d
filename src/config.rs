//! Process-wide defaults, read once and otherwise passive (§4.10 of the
//! design notes). None of these are exposed as public knobs: the library's
//! behavior should not depend on the caller's shell environment, only on
//! explicit builder calls.

/// Per-read chunk size used by the output drainer.
pub(crate) const DRAIN_CHUNK_SIZE: usize = 8 * 1024;

/// Whether the POSIX backend is forced onto the fork/exec fallback path
/// regardless of what the fast-path strategy check would otherwise choose.
///
/// Read fresh from `PROCLY_FORCE_FALLBACK` on every call (any non-empty
/// value enables it) rather than cached, so a test process that flips the
/// env var partway through its run is observed immediately. This exists
/// purely so integration tests can exercise the fallback path on platforms
/// where the fast path would otherwise always be eligible; it is not part
/// of the public API.
pub(crate) fn force_fallback() -> bool {
    std::env::var_os("PROCLY_FORCE_FALLBACK").is_some_and(|v| !v.is_empty())
}

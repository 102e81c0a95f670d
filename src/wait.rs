//! The timeout + graceful-termination wait policy (§4.4): a pure state
//! machine over a [`WaitOps`] interface and a [`Clock`], so it can be
//! tested without spawning a real process.

use std::time::Duration;

use crate::clock::Clock;
use crate::error::{Error, ErrorKind, Result};
use crate::status::ExitStatus;

/// How long to wait after escalating to `kill` before giving up on a clean
/// reap and returning anyway. Mirrors the teacher crate's exponential-backoff
/// poll loop, but bounded by an explicit grace period rather than the
/// caller's own deadline.
const POLL_STEP: Duration = Duration::from_millis(1);

/// Options controlling how long `wait` may block and how much time a child
/// gets to exit gracefully before being killed.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Option<Duration>,
    pub kill_grace: Duration,
}

impl Default for WaitOptions {
    fn default() -> WaitOptions {
        WaitOptions {
            timeout: None,
            kill_grace: Duration::from_millis(200),
        }
    }
}

/// The operations the wait policy needs from a process handle. Implemented
/// by [`crate::child::Child`] for real children and by a mock in tests.
pub(crate) trait WaitOps {
    fn try_wait(&self) -> Result<Option<ExitStatus>>;
    fn wait_blocking(&self) -> Result<ExitStatus>;
    fn terminate(&self) -> Result<()>;
    fn kill(&self) -> Result<()>;
}

/// Runs the wait policy described in the design notes: poll until timeout,
/// then terminate, then poll through the grace period, then kill and reap.
pub(crate) fn wait_with_policy(
    ops: &impl WaitOps,
    clock: &impl Clock,
    options: WaitOptions,
) -> Result<ExitStatus> {
    let Some(timeout) = options.timeout else {
        return ops.wait_blocking();
    };

    let start = clock.now();
    tracing::trace!(elapsed = ?start.duration_since(start), "wait policy: poll");
    let deadline = start + timeout;
    loop {
        if let Some(status) = ops.try_wait()? {
            return Ok(status);
        }
        if clock.now() >= deadline {
            break;
        }
        clock.sleep(POLL_STEP);
    }

    tracing::trace!(elapsed = ?clock.now().duration_since(start), "wait policy: terminate");
    ops.terminate()?;
    let grace_deadline = clock.now() + options.kill_grace;
    loop {
        if ops.try_wait()?.is_some() {
            return Err(Error::new(ErrorKind::Timeout, "process exited only after escalation"));
        }
        if clock.now() >= grace_deadline {
            break;
        }
        clock.sleep(POLL_STEP);
    }

    tracing::trace!(elapsed = ?clock.now().duration_since(start), "wait policy: kill");
    ops.kill()?;
    let _ = ops.wait_blocking();
    Err(Error::new(ErrorKind::Timeout, "process did not exit within timeout"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::mock::MockClock;
    use std::cell::{Cell, RefCell};

    struct MockOps {
        /// Number of `try_wait` polls after which the process "exits".
        exits_after_polls: Option<u32>,
        polls: Cell<u32>,
        terminated: Cell<bool>,
        killed: Cell<bool>,
        /// If set, the process only exits after `terminate` is called, this
        /// many polls later (simulating a graceful-but-late exit).
        exits_after_terminate_polls: RefCell<Option<u32>>,
    }

    impl WaitOps for MockOps {
        fn try_wait(&self) -> Result<Option<ExitStatus>> {
            self.polls.set(self.polls.get() + 1);
            if let Some(mut n) = *self.exits_after_terminate_polls.borrow_mut() {
                if self.terminated.get() {
                    if n == 0 {
                        return Ok(Some(ExitStatus::exited(0)));
                    }
                    n -= 1;
                    *self.exits_after_terminate_polls.borrow_mut() = Some(n);
                }
                return Ok(None);
            }
            if let Some(n) = self.exits_after_polls {
                if self.polls.get() >= n {
                    return Ok(Some(ExitStatus::exited(0)));
                }
            }
            Ok(None)
        }

        fn wait_blocking(&self) -> Result<ExitStatus> {
            Ok(ExitStatus::exited(0))
        }

        fn terminate(&self) -> Result<()> {
            self.terminated.set(true);
            Ok(())
        }

        fn kill(&self) -> Result<()> {
            self.killed.set(true);
            Ok(())
        }
    }

    #[test]
    fn no_timeout_delegates_to_blocking_wait() {
        let ops = MockOps {
            exits_after_polls: None,
            polls: Cell::new(0),
            terminated: Cell::new(false),
            killed: Cell::new(false),
            exits_after_terminate_polls: RefCell::new(None),
        };
        let clock = MockClock::new();
        let status = wait_with_policy(&ops, &clock, WaitOptions { timeout: None, ..Default::default() }).unwrap();
        assert!(status.success());
        assert!(!ops.terminated.get());
    }

    #[test]
    fn exits_before_deadline_returns_status_without_escalation() {
        let ops = MockOps {
            exits_after_polls: Some(3),
            polls: Cell::new(0),
            terminated: Cell::new(false),
            killed: Cell::new(false),
            exits_after_terminate_polls: RefCell::new(None),
        };
        let clock = MockClock::new();
        let opts = WaitOptions { timeout: Some(Duration::from_secs(10)), kill_grace: Duration::from_millis(50) };
        let status = wait_with_policy(&ops, &clock, opts).unwrap();
        assert!(status.success());
        assert!(!ops.terminated.get());
        assert!(!ops.killed.get());
    }

    #[test]
    fn late_graceful_exit_after_terminate_still_reports_timeout() {
        let ops = MockOps {
            exits_after_polls: None,
            polls: Cell::new(0),
            terminated: Cell::new(false),
            killed: Cell::new(false),
            exits_after_terminate_polls: RefCell::new(Some(1)),
        };
        let clock = MockClock::new();
        let opts = WaitOptions { timeout: Some(Duration::from_millis(5)), kill_grace: Duration::from_millis(50) };
        let err = wait_with_policy(&ops, &clock, opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(ops.terminated.get());
        assert!(!ops.killed.get());
    }

    #[test]
    fn never_exiting_process_is_killed_and_reaped() {
        let ops = MockOps {
            exits_after_polls: None,
            polls: Cell::new(0),
            terminated: Cell::new(false),
            killed: Cell::new(false),
            exits_after_terminate_polls: RefCell::new(None),
        };
        let clock = MockClock::new();
        let opts = WaitOptions { timeout: Some(Duration::from_millis(5)), kill_grace: Duration::from_millis(20) };
        let err = wait_with_policy(&ops, &clock, opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(ops.terminated.get());
        assert!(ops.killed.get());
    }
}

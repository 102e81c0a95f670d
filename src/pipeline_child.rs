//! Pipeline wiring and the handle returned by [`crate::Pipeline::spawn`]
//! (§4.6). Each stage is spawned via the single-process backend entry point;
//! this module only owns the inter-stage pipe plumbing and aggregate
//! status/termination semantics.

use std::time::{Duration, Instant};

use crate::backend::posix;
use crate::child::Child;
use crate::drainer;
use crate::error::{Error, ErrorKind, Result};
use crate::fd::OwnedFd;
use crate::output::Output;
use crate::pipe::{PipeReader, PipeWriter};
use crate::spec::{PipelineSpec, StdioSpec};
use crate::status::ExitStatus;
use crate::wait::WaitOptions;

/// A running pipeline: one [`Child`] per stage.
pub struct PipelineChild {
    stages: Vec<Child>,
    pipefail: bool,
}

/// The outcome of waiting on a whole [`PipelineChild`]: every stage's own
/// status, plus the pipeline's aggregate status (see
/// [`Pipeline::pipefail`](crate::Pipeline::pipefail)).
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub stages: Vec<ExitStatus>,
    pub aggregate: ExitStatus,
}

pub(crate) fn spawn_pipeline(pipe: PipelineSpec) -> Result<PipelineChild> {
    let stage_count = pipe.stages.len();
    let pipefail = pipe.pipefail;
    let new_process_group = pipe.new_process_group;

    let mut stages: Vec<Child> = Vec::with_capacity(stage_count);
    let mut prev_stdout: Option<OwnedFd> = None;
    let mut group_leader: Option<libc::pid_t> = None;

    for (idx, mut stage) in pipe.stages.into_iter().enumerate() {
        if let Some(prev) = &prev_stdout {
            stage.stdin = StdioSpec::Fd(prev.raw());
        }
        if idx != stage_count - 1 {
            stage.stdout = StdioSpec::Piped;
        }
        if new_process_group {
            stage.process_group = Some(group_leader.unwrap_or(0));
        }

        let spawned = match posix::spawn_stage(stage) {
            Ok(spawned) => spawned,
            Err(e) => {
                kill_and_reap(&stages);
                return Err(e);
            }
        };
        if idx == 0 {
            group_leader = spawned.pgid.or(Some(spawned.pid));
        }

        tracing::debug!(stage = idx, pid = spawned.pid, "pipeline stage spawned");
        let mut child = Child::new(spawned, new_process_group);
        // The previous stage's read of its own stdout fd is no longer
        // needed once this stage has dup'd it onto its stdin; dropping it
        // here lets that stage observe EOF/SIGPIPE correctly once this
        // stage is the only remaining reader.
        prev_stdout = if idx != stage_count - 1 { child.take_stdout().map(PipeReader::into_fd) } else { None };

        stages.push(child);
    }

    Ok(PipelineChild { stages, pipefail })
}

fn kill_and_reap(stages: &[Child]) {
    tracing::debug!(stages = stages.len(), "pipeline spawn failed, killing earlier stages");
    for child in stages {
        let _ = child.kill();
    }
    // Child::drop() performs the blocking reap; nothing further to do here.
}

pub(crate) fn drain_and_wait(mut child: PipelineChild, options: WaitOptions) -> Result<Output> {
    let last = child.stages.len() - 1;
    let stdout = child.stages[last].take_stdout();
    let stderr = child.stages[last].take_stderr();

    let (stdout_buf, stderr_buf) = drainer::drain_two(stdout, stderr)?;
    let status = child.wait(options)?;
    Ok(Output::new(stdout_buf, stderr_buf, status.aggregate))
}

impl PipelineChild {
    pub fn take_stdin(&mut self) -> Option<PipeWriter> {
        self.stages.first_mut().and_then(|c| c.take_stdin())
    }

    pub fn take_stdout(&mut self) -> Option<PipeReader> {
        self.stages.last_mut().and_then(|c| c.take_stdout())
    }

    pub fn take_stderr(&mut self) -> Option<PipeReader> {
        self.stages.last_mut().and_then(|c| c.take_stderr())
    }

    pub fn terminate(&self) -> Result<()> {
        for stage in &self.stages {
            stage.terminate()?;
        }
        Ok(())
    }

    pub fn kill(&self) -> Result<()> {
        for stage in &self.stages {
            stage.kill()?;
        }
        Ok(())
    }

    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        let mut all_done = true;
        let mut last_status = None;
        for stage in &mut self.stages {
            match stage.try_wait()? {
                Some(st) => last_status = Some(st),
                None => all_done = false,
            }
        }
        Ok(if all_done { last_status } else { None })
    }

    pub fn wait(&mut self, options: WaitOptions) -> Result<PipelineStatus> {
        let statuses = wait_all_stages(&mut self.stages, options)?;
        let aggregate = aggregate_status(&statuses, self.pipefail);
        Ok(PipelineStatus { stages: statuses, aggregate })
    }
}

fn wait_all_stages(stages: &mut [Child], options: WaitOptions) -> Result<Vec<ExitStatus>> {
    let Some(timeout) = options.timeout else {
        return stages.iter_mut().map(|c| c.wait(WaitOptions::default())).collect();
    };

    let mut statuses: Vec<Option<ExitStatus>> = vec![None; stages.len()];
    let deadline = Instant::now() + timeout;
    loop {
        if poll_all(stages, &mut statuses)? {
            return Ok(statuses.into_iter().map(Option::unwrap).collect());
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    for stage in stages.iter() {
        let _ = stage.terminate();
    }
    let grace_deadline = Instant::now() + options.kill_grace;
    loop {
        if poll_all(stages, &mut statuses)? {
            return Err(Error::new(ErrorKind::Timeout, "pipeline exited only after escalation"));
        }
        if Instant::now() >= grace_deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    for stage in stages.iter() {
        let _ = stage.kill();
    }
    for stage in stages.iter_mut() {
        let _ = stage.wait(WaitOptions::default());
    }
    Err(Error::new(ErrorKind::Timeout, "pipeline did not exit within timeout"))
}

/// Polls every not-yet-finished stage once, recording any status it just
/// finished with. Returns whether every stage is now accounted for.
fn poll_all(stages: &mut [Child], statuses: &mut [Option<ExitStatus>]) -> Result<bool> {
    let mut all_done = true;
    for (i, stage) in stages.iter_mut().enumerate() {
        if statuses[i].is_none() {
            match stage.try_wait()? {
                Some(st) => statuses[i] = Some(st),
                None => all_done = false,
            }
        }
    }
    Ok(all_done)
}

fn aggregate_status(statuses: &[ExitStatus], pipefail: bool) -> ExitStatus {
    if pipefail {
        if let Some(failed) = statuses.iter().find(|s| !s.success()) {
            return *failed;
        }
    }
    *statuses.last().expect("pipeline has at least one stage")
}

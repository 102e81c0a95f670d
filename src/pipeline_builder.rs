//! The user-facing pipeline builder (§4.6): a sequence of [`Command`]s
//! chained stdout-to-stdin, spawned and waited on together.

use std::ops::BitOr;

use crate::error::Result;
use crate::lowering::{self, LowerMode};
use crate::output::Output;
use crate::pipeline_child::PipelineChild;
use crate::command::Command;
use crate::stdio::Stdio;
use crate::wait::WaitOptions;

/// A pipeline of commands, each stage's stdout feeding the next stage's
/// stdin, the way a shell connects `a | b | c`.
///
/// Only the first stage's stdin and the last stage's stdout/stderr can be
/// redirected; every stage in between is always piped to its neighbors.
#[derive(Clone, Default)]
#[must_use]
pub struct Pipeline {
    pub(crate) commands: Vec<Command>,
    pub(crate) stdin: Option<Stdio>,
    pub(crate) stdout: Option<Stdio>,
    pub(crate) stderr: Option<Stdio>,
    pub(crate) pipefail: bool,
    pub(crate) new_process_group: bool,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    /// Starts a pipeline with a single stage.
    pub fn from(cmd: Command) -> Pipeline {
        Pipeline { commands: vec![cmd], ..Pipeline::default() }
    }

    /// Appends another stage, fed by the previous stage's stdout.
    pub fn then(mut self, cmd: Command) -> Pipeline {
        self.commands.push(cmd);
        self
    }

    pub fn stdin(mut self, stdio: Stdio) -> Pipeline {
        self.stdin = Some(stdio);
        self
    }

    pub fn stdout(mut self, stdio: Stdio) -> Pipeline {
        self.stdout = Some(stdio);
        self
    }

    pub fn stderr(mut self, stdio: Stdio) -> Pipeline {
        self.stderr = Some(stdio);
        self
    }

    /// Requests that the pipeline's overall status be the first non-zero
    /// stage status rather than simply the last stage's, mirroring a shell's
    /// `set -o pipefail`.
    pub fn pipefail(mut self) -> Pipeline {
        self.pipefail = true;
        self
    }

    /// Spawns every stage into one new process group, so a single
    /// [`PipelineChild::terminate`]/[`PipelineChild::kill`] reaches all of
    /// them (and any of their own children) at once.
    pub fn new_process_group(mut self) -> Pipeline {
        self.new_process_group = true;
        self
    }

    pub fn spawn(self) -> Result<PipelineChild> {
        let spec = lowering::lower_pipeline(self, LowerMode::Spawn)?;
        crate::pipeline_child::spawn_pipeline(spec)
    }

    pub fn status(self) -> Result<crate::status::ExitStatus> {
        let mut child = self.spawn()?;
        Ok(child.wait(WaitOptions::default())?.aggregate)
    }

    pub fn output(self) -> Result<Output> {
        let spec = lowering::lower_pipeline(self, LowerMode::Output)?;
        let child = crate::pipeline_child::spawn_pipeline(spec)?;
        crate::pipeline_child::drain_and_wait(child, WaitOptions::default())
    }
}

/// `a | b` builds a two-stage pipeline; chain further with more `|`.
impl BitOr for Command {
    type Output = Pipeline;

    fn bitor(self, rhs: Command) -> Pipeline {
        Pipeline::from(self).then(rhs)
    }
}

impl BitOr<Command> for Pipeline {
    type Output = Pipeline;

    fn bitor(self, rhs: Command) -> Pipeline {
        self.then(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitor_composes_commands_into_a_pipeline() {
        let pipe = Command::new("a") | Command::new("b") | Command::new("c");
        assert_eq!(pipe.commands.len(), 3);
    }
}

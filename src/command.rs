//! The user-facing process builder. Lowering (see `lowering.rs`) turns a
//! `Command` into a [`crate::spec::SpawnSpec`] just before spawn.

use std::collections::HashSet;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::child::Child;
use crate::error::Result;
use crate::lowering::{self, LowerMode};
use crate::output::Output;
use crate::status::ExitStatus;
use crate::stdio::Stdio;
use crate::wait::WaitOptions;

#[derive(Debug, Clone)]
pub(crate) enum EnvAction {
    Set(OsString),
    Unset,
}

/// A builder for a single child process.
///
/// Unlike a shell, `Command` never interprets its argument as a command
/// line: each argument is passed to the child exactly as given, with no
/// quoting or globbing.
#[derive(Clone)]
#[must_use]
pub struct Command {
    pub(crate) argv: Vec<OsString>,
    pub(crate) cwd: Option<PathBuf>,
    pub(crate) inherit_env: bool,
    pub(crate) env_delta: Vec<(OsString, EnvAction)>,
    pub(crate) stdin: Option<Stdio>,
    pub(crate) stdout: Option<Stdio>,
    pub(crate) stderr: Option<Stdio>,
    pub(crate) new_process_group: bool,
    pub(crate) merge_stderr_into_stdout: bool,
}

impl Command {
    /// Starts building a command that runs `program` with no arguments.
    pub fn new(program: impl AsRef<OsStr>) -> Command {
        Command {
            argv: vec![program.as_ref().to_owned()],
            cwd: None,
            inherit_env: true,
            env_delta: Vec::new(),
            stdin: None,
            stdout: None,
            stderr: None,
            new_process_group: false,
            merge_stderr_into_stdout: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Command {
        self.argv.push(arg.as_ref().to_owned());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Command {
        self.argv.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Command {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Clears the environment the child would otherwise inherit.
    ///
    /// Env vars set afterward with [`env`](Self::env) still apply.
    pub fn env_clear(mut self) -> Command {
        self.inherit_env = false;
        self.env_delta.clear();
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Command {
        self.env_delta
            .push((key.as_ref().to_owned(), EnvAction::Set(value.as_ref().to_owned())));
        self
    }

    pub fn env_extend(
        mut self,
        vars: impl IntoIterator<Item = (impl AsRef<OsStr>, impl AsRef<OsStr>)>,
    ) -> Command {
        self.env_delta.extend(
            vars.into_iter()
                .map(|(k, v)| (k.as_ref().to_owned(), EnvAction::Set(v.as_ref().to_owned()))),
        );
        self
    }

    pub fn env_remove(mut self, key: impl AsRef<OsStr>) -> Command {
        self.env_delta.push((key.as_ref().to_owned(), EnvAction::Unset));
        self
    }

    pub fn stdin(mut self, stdio: Stdio) -> Command {
        self.stdin = Some(stdio);
        self
    }

    pub fn stdout(mut self, stdio: Stdio) -> Command {
        self.stdout = Some(stdio);
        self
    }

    pub fn stderr(mut self, stdio: Stdio) -> Command {
        self.stderr = Some(stdio);
        self
    }

    /// Spawns the child into its own process group.
    pub fn new_process_group(mut self) -> Command {
        self.new_process_group = true;
        self
    }

    /// Requests the child's stderr be duplicated onto its stdout.
    ///
    /// Overrides any explicit `stderr` selection.
    pub fn merge_stderr_into_stdout(mut self) -> Command {
        self.merge_stderr_into_stdout = true;
        self
    }

    /// Resolves the environment the child would run with, applying
    /// `env_delta` over the inherited environment (or nothing, if env was
    /// cleared). The last action for a given key wins.
    pub(crate) fn resolve_env(&self) -> Vec<(OsString, OsString)> {
        let mut base: Vec<(OsString, OsString)> = if self.inherit_env {
            env::vars_os().collect()
        } else {
            Vec::new()
        };
        for (key, action) in &self.env_delta {
            base.retain(|(k, _)| k != key);
            if let EnvAction::Set(value) = action {
                base.push((key.clone(), value.clone()));
            }
        }
        // last-wins is already guaranteed by the retain-then-push loop above,
        // but guard against duplicate `env()` calls for the same key too.
        let mut seen = HashSet::new();
        let mut out: Vec<_> = base
            .into_iter()
            .rev()
            .filter(|(k, _)| seen.insert(k.clone()))
            .collect();
        out.reverse();
        out
    }

    pub fn spawn(self) -> Result<Child> {
        let spec = lowering::lower_command(self, LowerMode::Spawn, None)?;
        crate::backend::posix::spawn_command(spec)
    }

    pub fn status(self) -> Result<ExitStatus> {
        let child = self.spawn()?;
        child.wait(WaitOptions::default())
    }

    pub fn output(self) -> Result<Output> {
        let spec = lowering::lower_command(self, LowerMode::Output, None)?;
        let child = crate::backend::posix::spawn_command(spec)?;
        crate::drainer::drain_and_wait(child, WaitOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_applies_set_and_unset_last_wins() {
        let cmd = Command::new("true")
            .env_clear()
            .env("A", "1")
            .env("A", "2")
            .env("B", "x")
            .env_remove("B");
        let env = cmd.resolve_env();
        assert_eq!(env, vec![(OsString::from("A"), OsString::from("2"))]);
    }

    #[test]
    fn resolve_env_clear_drops_inherited() {
        let cmd = Command::new("true").env_clear();
        assert!(cmd.resolve_env().is_empty());
    }
}

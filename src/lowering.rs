//! Pure translation from user-facing builders to resolved specs.
//!
//! Nothing in this module performs a syscall; it only validates and
//! resolves. This lets the validation and environment-composition logic be
//! tested without forking a single process.

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;

use crate::command::Command;
use crate::error::{Error, ErrorKind, Result};
use crate::pipeline_builder::Pipeline;
use crate::spec::{PipelineSpec, SpawnSpec, StdioSpec};
use crate::stdio::Stdio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LowerMode {
    Spawn,
    Output,
}

/// Per-stream overrides the pipeline composition layer injects into a stage
/// before lowering (inter-stage pipe ends, pipeline-level stdin/stdout/stderr).
#[derive(Default)]
pub(crate) struct StdioOverrides {
    pub stdin: Option<Stdio>,
    pub stdout: Option<Stdio>,
    pub stderr: Option<Stdio>,
}

pub(crate) fn lower_command(
    cmd: Command,
    mode: LowerMode,
    overrides: Option<StdioOverrides>,
) -> Result<SpawnSpec> {
    if cmd.argv.is_empty() || cmd.argv[0].is_empty() {
        return Err(Error::new(ErrorKind::EmptyArgv, "argv must not be empty"));
    }

    let overrides = overrides.unwrap_or_default();
    let stdin_sel = overrides.stdin.or(cmd.stdin);
    let mut stdout_sel = overrides.stdout.or(cmd.stdout);
    let mut stderr_sel = overrides.stderr.or(cmd.stderr);

    if mode == LowerMode::Output {
        stdout_sel = Some(stdout_sel.unwrap_or(Stdio::Piped));
        stderr_sel = Some(stderr_sel.unwrap_or(Stdio::Piped));
    }

    let stdin = resolve_stdio(stdin_sel.unwrap_or(Stdio::Inherit), Direction::In)?;
    let stdout = resolve_stdio(stdout_sel.unwrap_or(Stdio::Inherit), Direction::Out)?;
    let stderr = if cmd.merge_stderr_into_stdout {
        StdioSpec::DupStdout
    } else {
        resolve_stdio(stderr_sel.unwrap_or(Stdio::Inherit), Direction::Out)?
    };

    let argv = cmd.argv.iter().map(|a| a.as_bytes().to_vec()).collect();
    let envp = format_env(cmd.resolve_env());

    Ok(SpawnSpec {
        argv,
        cwd: cmd.cwd,
        envp,
        stdin,
        stdout,
        stderr,
        process_group: if cmd.new_process_group { Some(0) } else { None },
    })
}

#[derive(Clone, Copy)]
enum Direction {
    In,
    Out,
}

fn resolve_stdio(stdio: Stdio, dir: Direction) -> Result<StdioSpec> {
    match &stdio {
        Stdio::Fd(fd) if *fd < 0 => {
            return Err(Error::new(ErrorKind::InvalidStdio, format!("invalid fd {fd}")));
        }
        Stdio::File { mode, .. } => {
            let ok = match dir {
                Direction::In => mode.readable(),
                Direction::Out => mode.writable(),
            };
            if !ok {
                return Err(Error::new(
                    ErrorKind::InvalidStdio,
                    "file open mode does not match stream direction",
                ));
            }
        }
        _ => {}
    }
    Ok(stdio.into())
}

fn format_env(env: Vec<(OsString, OsString)>) -> Vec<Vec<u8>> {
    let mut formatted: Vec<Vec<u8>> = env
        .into_iter()
        .map(|(k, v)| {
            let mut buf = k.as_bytes().to_vec();
            buf.push(b'=');
            buf.extend_from_slice(v.as_bytes());
            buf
        })
        .collect();
    formatted.sort();
    formatted
}

pub(crate) fn lower_pipeline(pipe: Pipeline, mode: LowerMode) -> Result<PipelineSpec> {
    if pipe.commands.is_empty() {
        return Err(Error::new(ErrorKind::InvalidPipeline, "pipeline must not be empty"));
    }

    let last = pipe.commands.len() - 1;
    let mut stages = Vec::with_capacity(pipe.commands.len());
    for (i, cmd) in pipe.commands.into_iter().enumerate() {
        let mut overrides = StdioOverrides::default();
        if i == 0 {
            overrides.stdin = pipe.stdin.clone();
        }
        if i == last {
            overrides.stdout = pipe.stdout.clone();
            overrides.stderr = pipe.stderr.clone();
        }
        let stage_mode = if i == last { mode } else { LowerMode::Spawn };
        stages.push(lower_command(cmd, stage_mode, Some(overrides))?);
    }

    Ok(PipelineSpec {
        stages,
        pipefail: pipe.pipefail,
        new_process_group: pipe.new_process_group,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_argv_rejected() {
        let cmd = Command::new("");
        let err = lower_command(cmd, LowerMode::Spawn, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyArgv);
    }

    #[test]
    fn negative_fd_rejected() {
        let cmd = Command::new("true").stdin(Stdio::fd(-1));
        let err = lower_command(cmd, LowerMode::Spawn, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStdio);
    }

    #[test]
    fn write_only_stdin_file_rejected() {
        let cmd = Command::new("true")
            .stdin(Stdio::file_with_mode("/tmp/x", crate::stdio::OpenMode::WriteTruncate));
        let err = lower_command(cmd, LowerMode::Spawn, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStdio);
    }

    #[test]
    fn output_mode_defaults_to_piped() {
        let cmd = Command::new("true");
        let spec = lower_command(cmd, LowerMode::Output, None).unwrap();
        assert!(matches!(spec.stdout, StdioSpec::Piped));
        assert!(matches!(spec.stderr, StdioSpec::Piped));
    }

    #[test]
    fn merge_stderr_replaces_selection() {
        let cmd = Command::new("true").merge_stderr_into_stdout().stderr(Stdio::piped());
        let spec = lower_command(cmd, LowerMode::Spawn, None).unwrap();
        assert!(matches!(spec.stderr, StdioSpec::DupStdout));
    }

    #[test]
    fn empty_pipeline_rejected() {
        let err = lower_pipeline(Pipeline::new(), LowerMode::Spawn).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPipeline);
    }
}

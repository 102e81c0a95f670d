//! Execution of child processes and pipelines on POSIX systems.
//!
//! This crate builds a [`Command`] (or chains several into a [`Pipeline`]
//! with `|`), then spawns it with [`Command::spawn`], [`Command::status`],
//! or [`Command::output`]. Spawning goes through a `posix_spawn` fast path
//! when the configuration allows it, falling back to a manual fork/exec
//! otherwise; callers don't need to know which one ran.
//!
//! ```no_run
//! use procly::{Command, Stdio};
//!
//! # fn main() -> procly::Result<()> {
//! let output = Command::new("echo")
//!     .arg("hello")
//!     .stdout(Stdio::piped())
//!     .output()?;
//! assert!(output.status.success());
//! # Ok(())
//! # }
//! ```
//!
//! Windows is out of scope: every backend in this crate assumes POSIX
//! process semantics (`fork`, `waitpid`, process groups, signals).

#![warn(missing_docs)]

mod backend;
mod child;
mod clock;
mod command;
mod config;
mod drainer;
mod error;
mod fd;
mod lowering;
mod output;
mod pipe;
mod pipeline_builder;
mod pipeline_child;
mod spec;
mod status;
mod stdio;
mod streams;
mod wait;

pub use child::Child;
pub use command::Command;
pub use error::{Error, ErrorKind, Result};
pub use output::Output;
pub use pipe::{PipeReader, PipeWriter};
pub use pipeline_builder::Pipeline;
pub use pipeline_child::{PipelineChild, PipelineStatus};
pub use status::ExitStatus;
pub use stdio::{OpenMode, Stdio};
pub use streams::{
    ChildStderrReader, ChildStdinWriter, ChildStdoutReader, PipelineStdinWriter,
    PipelineStdoutReader,
};
pub use wait::WaitOptions;

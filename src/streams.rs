//! `Read`/`Write` adapters over a child's piped stdio (§4.8).
//!
//! Each adapter owns the [`Child`] (or [`PipelineChild`]) it was built from,
//! so dropping the adapter waits for the process the way dropping a `Child`
//! directly does.

use std::io::{self, Read, Write};

use crate::child::Child;
use crate::pipe::{PipeReader, PipeWriter};
use crate::pipeline_child::PipelineChild;

impl Child {
    /// Takes stdout and returns an adapter that reads from it, waiting for
    /// the child on drop. `None` if stdout wasn't piped.
    pub fn into_stdout_reader(mut self) -> Option<ChildStdoutReader> {
        let reader = self.take_stdout()?;
        Some(ChildStdoutReader { child: self, reader })
    }

    /// Takes stderr and returns an adapter that reads from it, waiting for
    /// the child on drop. `None` if stderr wasn't piped.
    pub fn into_stderr_reader(mut self) -> Option<ChildStderrReader> {
        let reader = self.take_stderr()?;
        Some(ChildStderrReader { child: self, reader })
    }

    /// Takes stdin and returns an adapter that writes to it, waiting for the
    /// child on drop. `None` if stdin wasn't piped.
    pub fn into_stdin_writer(mut self) -> Option<ChildStdinWriter> {
        let writer = self.take_stdin()?;
        Some(ChildStdinWriter { child: self, writer })
    }
}

/// Reads a child's stdout; waits for the child when dropped.
pub struct ChildStdoutReader {
    child: Child,
    reader: PipeReader,
}

impl Read for ChildStdoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_some(buf).map_err(Into::into)
    }
}

impl ChildStdoutReader {
    /// Gives back the underlying child, e.g. to inspect its exit status
    /// after reading to EOF.
    pub fn into_child(self) -> Child {
        self.child
    }
}

/// Reads a child's stderr; waits for the child when dropped.
pub struct ChildStderrReader {
    child: Child,
    reader: PipeReader,
}

impl Read for ChildStderrReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_some(buf).map_err(Into::into)
    }
}

impl ChildStderrReader {
    pub fn into_child(self) -> Child {
        self.child
    }
}

/// Writes to a child's stdin; waits for the child when dropped.
pub struct ChildStdinWriter {
    child: Child,
    writer: PipeWriter,
}

impl Write for ChildStdinWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write_some(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ChildStdinWriter {
    pub fn into_child(self) -> Child {
        self.child
    }
}

impl PipelineChild {
    /// Takes the last stage's stdout and returns an adapter that reads from
    /// it, waiting for the whole pipeline on drop. `None` if not piped.
    pub fn into_stdout_reader(mut self) -> Option<PipelineStdoutReader> {
        let reader = self.take_stdout()?;
        Some(PipelineStdoutReader { pipeline: self, reader })
    }

    /// Takes the first stage's stdin and returns an adapter that writes to
    /// it, waiting for the whole pipeline on drop. `None` if not piped.
    pub fn into_stdin_writer(mut self) -> Option<PipelineStdinWriter> {
        let writer = self.take_stdin()?;
        Some(PipelineStdinWriter { pipeline: self, writer })
    }
}

/// Reads a pipeline's final stdout; waits for every stage when dropped.
pub struct PipelineStdoutReader {
    pipeline: PipelineChild,
    reader: PipeReader,
}

impl Read for PipelineStdoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_some(buf).map_err(Into::into)
    }
}

impl PipelineStdoutReader {
    pub fn into_pipeline(self) -> PipelineChild {
        self.pipeline
    }
}

/// Writes to a pipeline's first stdin; waits for every stage when dropped.
pub struct PipelineStdinWriter {
    pipeline: PipelineChild,
    writer: PipeWriter,
}

impl Write for PipelineStdinWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write_some(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl PipelineStdinWriter {
    pub fn into_pipeline(self) -> PipelineChild {
        self.pipeline
    }
}

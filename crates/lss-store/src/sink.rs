use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, StdoutLock, Write};
use std::path::{Path, PathBuf};

use lss_core::LssError;

/// Destination of a measurement: a file, or the process standard output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// Standard output, selected by the path `-` or an empty path.
    Stdout,
    /// A file, truncated on open.
    Path(PathBuf),
}

impl Sink {
    /// Interprets a user supplied output path.
    pub fn parse(path: impl AsRef<Path>) -> Sink {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || path == Path::new("-") {
            Sink::Stdout
        } else {
            Sink::Path(path.to_path_buf())
        }
    }

    /// Whether the sink is the standard output.
    pub fn is_stdout(&self) -> bool {
        matches!(self, Sink::Stdout)
    }

    /// Opens the sink for one write.
    pub fn open(&self) -> Result<SinkGuard, LssError> {
        let target = match self {
            Sink::Stdout => Target::Stdout(io::stdout().lock()),
            Sink::Path(path) => {
                let file = File::create(path)
                    .map_err(|err| LssError::io("sink-create", path.display(), err))?;
                tracing::debug!(path = %path.display(), "opened measurement file");
                Target::File(BufWriter::new(file))
            }
        };
        Ok(SinkGuard {
            label: self.to_string(),
            target: Some(target),
        })
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Stdout => f.write_str("<stdout>"),
            Sink::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

enum Target {
    Stdout(StdoutLock<'static>),
    File(BufWriter<File>),
}

/// An open sink, valid for one write.
///
/// Dropping the guard closes a file sink on every path, including early
/// returns on error. The standard output is flushed and left open.
pub struct SinkGuard {
    label: String,
    target: Option<Target>,
}

impl SinkGuard {
    /// Flushes and releases the sink, reporting any failure.
    pub fn finish(mut self) -> Result<(), LssError> {
        let result = match self.target.take() {
            Some(Target::Stdout(mut out)) => out.flush(),
            Some(Target::File(mut writer)) => writer.flush().and_then(|_| writer.get_ref().sync_all()),
            None => Ok(()),
        };
        result.map_err(|err| LssError::io("sink-flush", &self.label, err))
    }

    /// Human readable name of the sink.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn writer(&mut self) -> io::Result<&mut dyn Write> {
        match self.target.as_mut() {
            Some(Target::Stdout(out)) => Ok(out as &mut dyn Write),
            Some(Target::File(writer)) => Ok(writer as &mut dyn Write),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink already finished")),
        }
    }
}

impl Write for SinkGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        match self.target.take() {
            // Never closed: only flushed.
            Some(Target::Stdout(mut out)) => {
                let _ = out.flush();
            }
            Some(Target::File(writer)) => {
                if let Err(err) = writer.into_inner().map(drop) {
                    tracing::warn!(sink = %self.label, error = %err, "failed to flush measurement file");
                }
            }
            None => {}
        }
    }
}

impl fmt::Debug for SinkGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkGuard")
            .field("label", &self.label)
            .field("open", &self.target.is_some())
            .finish()
    }
}

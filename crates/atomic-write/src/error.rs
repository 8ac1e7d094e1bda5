use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for atomic write operations.
pub type AtomicWriteResult<T> = Result<T, AtomicWriteError>;

/// Stage of an atomic write at which a failure happened.
///
/// `Scheduling` means no Tokio runtime could run the write, or the runtime
/// shut down before the write reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStage {
    Scheduling,
    Opening,
    Writing,
    Flushing,
    Closing,
    Renaming,
}

impl WriteStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduling => "schedule",
            Self::Opening => "open",
            Self::Writing => "write",
            Self::Flushing => "sync",
            Self::Closing => "close",
            Self::Renaming => "rename",
        }
    }
}

/// The first error hit by an atomic write.
///
/// Carries the untouched `io::Error` from the filesystem so callers can match
/// on the OS error code. Errors raised while cleaning up are never reported
/// here.
#[derive(Debug, Error)]
#[error("atomic write failed to {} {}: {source}", .stage.as_str(), .path.display())]
pub struct AtomicWriteError {
    stage: WriteStage,
    path: PathBuf,
    #[source]
    source: io::Error,
}

impl AtomicWriteError {
    pub fn new(stage: WriteStage, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            stage,
            path: path.into(),
            source,
        }
    }

    pub fn stage(&self) -> WriteStage {
        self.stage
    }

    /// Path the failing operation acted on: the destination for `Renaming`
    /// and `Scheduling`, the temporary file otherwise.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        self.source.raw_os_error()
    }

    pub fn io_error(&self) -> &io::Error {
        &self.source
    }

    pub fn into_io_error(self) -> io::Error {
        self.source
    }
}

impl From<AtomicWriteError> for io::Error {
    fn from(error: AtomicWriteError) -> Self {
        error.into_io_error()
    }
}

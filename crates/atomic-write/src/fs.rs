//! Filesystem capability set used by the writer.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Raw OS code for "too many open files" on this platform.
#[cfg(not(windows))]
pub const TOO_MANY_OPEN_FILES_ERRNO: i32 = 24;
#[cfg(windows)]
pub const TOO_MANY_OPEN_FILES_ERRNO: i32 = 4;

/// Returns true when `error` is the transient per-process descriptor
/// exhaustion condition.
pub fn is_too_many_open_files(error: &io::Error) -> bool {
    error.raw_os_error() == Some(TOO_MANY_OPEN_FILES_ERRNO)
}

/// Filesystem operations an atomic write is built from.
///
/// `close` consumes the handle, so a handle is closed at most once.
#[async_trait]
pub trait AtomicFs: Send + Sync {
    type Handle: Send;

    /// Opens `path` for writing, creating it if absent and truncating it if
    /// present.
    async fn open(&self, path: &Path) -> io::Result<Self::Handle>;

    /// Writes a prefix of `buf`, returning how many bytes were accepted.
    async fn write(&self, handle: &mut Self::Handle, buf: &[u8]) -> io::Result<usize>;

    /// Forces written data to durable storage.
    async fn sync(&self, handle: &mut Self::Handle) -> io::Result<()>;

    async fn close(&self, handle: Self::Handle) -> io::Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`AtomicFs`] bound to the real filesystem through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

#[async_trait]
impl AtomicFs for TokioFs {
    type Handle = File;

    async fn open(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await
    }

    async fn write(&self, handle: &mut File, buf: &[u8]) -> io::Result<usize> {
        // Tokio accepts the bytes before the background write runs; drain it
        // so a failure such as ENOSPC is reported by this call.
        let written = handle.write(buf).await?;
        handle.flush().await?;
        Ok(written)
    }

    async fn sync(&self, handle: &mut File) -> io::Result<()> {
        handle.sync_all().await
    }

    async fn close(&self, mut handle: File) -> io::Result<()> {
        handle.flush().await?;
        let file = handle.into_std().await;
        tokio::task::spawn_blocking(move || close_file(file))
            .await
            .map_err(io::Error::from)?
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// Closes `file`, reporting the result of close(2) instead of discarding it
/// the way `Drop` does.
#[cfg(unix)]
fn close_file(file: std::fs::File) -> io::Result<()> {
    use std::os::fd::IntoRawFd;

    close_raw_fd(file.into_raw_fd())
}

#[cfg(unix)]
fn close_raw_fd(fd: std::os::fd::RawFd) -> io::Result<()> {
    nix::unistd::close(fd).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn close_file(file: std::fs::File) -> io::Result<()> {
    drop(file);
    Ok(())
}

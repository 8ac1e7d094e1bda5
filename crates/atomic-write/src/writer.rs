//! Stage, flush, and rename pipeline behind every atomic write.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{instrument, Instrument};

use crate::error::{AtomicWriteError, AtomicWriteResult, WriteStage};
use crate::fs::{is_too_many_open_files, AtomicFs, TokioFs};
use crate::options::AtomicWriteOptions;
use crate::temp_name::process_temp_names;

/// Replaces files all-or-nothing through a hidden sibling temp file.
///
/// A write opens `.<pid>.<counter>` next to the destination, writes the whole
/// buffer, syncs it, closes it, and renames it over the destination. Any
/// failure removes the temp file and reports the first error; the
/// destination is only ever touched by the final rename.
///
/// Concurrent writes to the same destination are safe; the last rename wins.
/// Cloning is cheap and clones share the filesystem.
#[derive(Debug, Default)]
pub struct AtomicWriter<F = TokioFs> {
    fs: Arc<F>,
    options: AtomicWriteOptions,
}

impl<F> Clone for AtomicWriter<F> {
    fn clone(&self) -> Self {
        Self {
            fs: Arc::clone(&self.fs),
            options: self.options,
        }
    }
}

impl AtomicWriter<TokioFs> {
    pub fn new() -> Self {
        Self::with_fs(TokioFs)
    }
}

impl<F: AtomicFs> AtomicWriter<F> {
    pub fn with_fs(fs: F) -> Self {
        Self {
            fs: Arc::new(fs),
            options: AtomicWriteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AtomicWriteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn options(&self) -> AtomicWriteOptions {
        self.options
    }

    /// Returns a fresh temporary path next to `destination`.
    pub fn temp_path_for(&self, destination: &Path) -> PathBuf {
        process_temp_names().next_temp_path(destination)
    }

    /// Atomically replaces `destination` with `content`.
    ///
    /// On success the destination holds exactly `content`, synced before the
    /// rename was issued. On failure the destination is unchanged and the
    /// temp file has been removed (best effort).
    ///
    /// The write runs on its own Tokio task. Dropping the returned future
    /// (timeout, `select!`, aborted caller) does not stop it; it still
    /// commits or rolls back.
    #[instrument(
        skip_all,
        fields(destination = %destination.display(), bytes = content.len())
    )]
    pub async fn write(&self, destination: &Path, content: &[u8]) -> AtomicWriteResult<()>
    where
        F: 'static,
    {
        let runtime = current_runtime(destination)?;
        let writer = self.clone();
        let task_destination = destination.to_path_buf();
        let content = content.to_vec();
        let task = runtime.spawn(
            async move { writer.run(&task_destination, &content).await }.in_current_span(),
        );
        match task.await {
            Ok(result) => result,
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(error) => Err(AtomicWriteError::new(
                WriteStage::Scheduling,
                destination,
                io::Error::from(error),
            )),
        }
    }

    /// Runs an atomic write on the Tokio runtime and hands the outcome to
    /// `on_complete`.
    ///
    /// `on_complete` runs exactly once, from the spawned task, never before
    /// this call returns. Without a current Tokio runtime nothing is
    /// spawned, `on_complete` is dropped unrun, and a `Scheduling` error is
    /// returned.
    pub fn write_with_callback<C, K>(
        &self,
        destination: impl Into<PathBuf>,
        content: C,
        on_complete: K,
    ) -> AtomicWriteResult<JoinHandle<()>>
    where
        F: 'static,
        C: AsRef<[u8]> + Send + Sync + 'static,
        K: FnOnce(AtomicWriteResult<()>) + Send + 'static,
    {
        let destination = destination.into();
        let runtime = current_runtime(&destination)?;
        let writer = self.clone();
        Ok(runtime.spawn(
            async move {
                let result = writer.run(&destination, content.as_ref()).await;
                on_complete(result);
            }
            .in_current_span(),
        ))
    }

    async fn run(&self, destination: &Path, content: &[u8]) -> AtomicWriteResult<()> {
        let temp_path = self.temp_path_for(destination);
        self.stage(&temp_path, content).await?;
        self.commit(&temp_path, destination).await
    }

    /// Writes `content` to a new file at `temp_path` and syncs it to disk.
    ///
    /// Unlike [`AtomicWriter::write`], this runs inline in the caller's
    /// future. The handle is closed before returning on every path. If
    /// anything fails after the file was opened, the file is removed and the
    /// original error is returned.
    #[instrument(skip_all, fields(temp_path = %temp_path.display()))]
    pub async fn stage(&self, temp_path: &Path, content: &[u8]) -> AtomicWriteResult<()> {
        let mut handle = self.open_with_retry(temp_path).await?;

        let written = match self.write_all(&mut handle, content).await {
            Ok(()) => self
                .fs
                .sync(&mut handle)
                .await
                .map_err(|error| AtomicWriteError::new(WriteStage::Flushing, temp_path, error)),
            Err(error) => Err(AtomicWriteError::new(WriteStage::Writing, temp_path, error)),
        };
        if let Err(error) = written {
            if let Err(close_error) = self.fs.close(handle).await {
                tracing::debug!(
                    temp_path = %temp_path.display(),
                    error = %close_error,
                    "ignoring close failure during rollback"
                );
            }
            self.discard(temp_path).await;
            return Err(error);
        }

        if let Err(error) = self.fs.close(handle).await {
            self.discard(temp_path).await;
            return Err(AtomicWriteError::new(WriteStage::Closing, temp_path, error));
        }
        Ok(())
    }

    /// Renames a fully staged `temp_path` over `destination`.
    ///
    /// This is the only step that modifies the destination. On failure the
    /// temp file is removed and the rename error is returned.
    #[instrument(
        skip_all,
        fields(temp_path = %temp_path.display(), destination = %destination.display())
    )]
    pub async fn commit(&self, temp_path: &Path, destination: &Path) -> AtomicWriteResult<()> {
        if let Err(error) = self.fs.rename(temp_path, destination).await {
            self.discard(temp_path).await;
            return Err(AtomicWriteError::new(
                WriteStage::Renaming,
                destination,
                error,
            ));
        }
        tracing::debug!("atomic write committed");
        Ok(())
    }

    async fn open_with_retry(&self, temp_path: &Path) -> AtomicWriteResult<F::Handle> {
        let mut retries: u64 = 0;
        loop {
            match self.fs.open(temp_path).await {
                Ok(handle) => return Ok(handle),
                Err(error)
                    if is_too_many_open_files(&error)
                        && self.options.allows_open_retry(retries) =>
                {
                    retries = retries.saturating_add(1);
                    tracing::debug!(
                        temp_path = %temp_path.display(),
                        retries,
                        "too many open files; retrying temp file open"
                    );
                    tokio::task::yield_now().await;
                }
                Err(error) => {
                    return Err(AtomicWriteError::new(
                        WriteStage::Opening,
                        temp_path,
                        error,
                    ))
                }
            }
        }
    }

    async fn write_all(&self, handle: &mut F::Handle, content: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < content.len() {
            let written = self.fs.write(handle, &content[offset..]).await?;
            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!(
                        "write accepted no bytes with {} remaining",
                        content.len() - offset
                    ),
                ));
            }
            offset = offset.saturating_add(written).min(content.len());
        }
        Ok(())
    }

    async fn discard(&self, temp_path: &Path) {
        if let Err(error) = self.fs.remove_file(temp_path).await {
            tracing::warn!(
                temp_path = %temp_path.display(),
                error = %error,
                "failed to remove temp file after atomic write failure"
            );
        }
    }
}

fn current_runtime(destination: &Path) -> AtomicWriteResult<Handle> {
    Handle::try_current().map_err(|error| {
        AtomicWriteError::new(WriteStage::Scheduling, destination, io::Error::other(error))
    })
}

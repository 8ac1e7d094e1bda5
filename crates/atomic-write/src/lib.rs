//! All-or-nothing file replacement for persisted state.
//!
//! Content is staged in a hidden temp file next to the destination, synced to
//! durable storage, and renamed over the destination. Readers observe either
//! the old or the new file, never a partial one, and a failed write leaves the
//! destination untouched.

pub mod error;
pub mod fs;
pub mod options;
pub mod temp_name;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tokio::task::JoinHandle;

pub use error::{AtomicWriteError, AtomicWriteResult, WriteStage};
pub use fs::{is_too_many_open_files, AtomicFs, TokioFs, TOO_MANY_OPEN_FILES_ERRNO};
pub use options::AtomicWriteOptions;
pub use temp_name::{is_temp_file_name, process_temp_names, TempNameGenerator};
pub use writer::AtomicWriter;

/// Writer over the real filesystem, configured from env on first use.
pub fn default_writer() -> &'static AtomicWriter {
    static WRITER: OnceLock<AtomicWriter> = OnceLock::new();
    WRITER.get_or_init(|| AtomicWriter::new().with_options(AtomicWriteOptions::from_env()))
}

/// Atomically replaces the file at `path` with `content`.
pub async fn write_atomic(
    path: impl AsRef<Path>,
    content: impl AsRef<[u8]>,
) -> AtomicWriteResult<()> {
    default_writer()
        .write(path.as_ref(), content.as_ref())
        .await
}

/// Atomically replaces the file at `path` with UTF-8 `content`.
pub async fn write_text_atomic(path: &Path, content: &str) -> AtomicWriteResult<()> {
    default_writer().write(path, content.as_bytes()).await
}

/// Callback form of [`write_atomic`]; see [`AtomicWriter::write_with_callback`].
pub fn write_atomic_with_callback<C, K>(
    path: impl Into<PathBuf>,
    content: C,
    on_complete: K,
) -> AtomicWriteResult<JoinHandle<()>>
where
    C: AsRef<[u8]> + Send + Sync + 'static,
    K: FnOnce(AtomicWriteResult<()>) + Send + 'static,
{
    default_writer().write_with_callback(path, content, on_complete)
}

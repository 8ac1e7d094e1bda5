//! Temporary file naming for staged writes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static PROCESS_TEMP_NAMES: TempNameGenerator = TempNameGenerator::new();

/// Process-wide generator shared by every writer.
pub fn process_temp_names() -> &'static TempNameGenerator {
    &PROCESS_TEMP_NAMES
}

/// Hands out hidden sibling names of the form `.<pid>.<counter>`.
///
/// Names are unique within a process. Nothing checks whether the name is
/// already taken on disk; the temp file is opened with create + truncate.
#[derive(Debug)]
pub struct TempNameGenerator {
    counter: AtomicU64,
}

impl TempNameGenerator {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Returns the next `<pid>.<counter>` id, advancing the counter.
    pub fn next_id(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}.{count}", std::process::id())
    }

    /// Returns a fresh temporary path in the directory of `destination`.
    pub fn next_temp_path(&self, destination: &Path) -> PathBuf {
        let parent_dir = destination
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        parent_dir.join(format!(".{}", self.next_id()))
    }
}

impl Default for TempNameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true when `file_name` looks like a name produced by
/// [`TempNameGenerator`].
pub fn is_temp_file_name(file_name: &str) -> bool {
    let Some(id) = file_name.strip_prefix('.') else {
        return false;
    };
    let Some((pid, count)) = id.split_once('.') else {
        return false;
    };
    !pid.is_empty()
        && !count.is_empty()
        && pid.bytes().all(|byte| byte.is_ascii_digit())
        && count.bytes().all(|byte| byte.is_ascii_digit())
}

const MAX_OPEN_RETRIES_ENV: &str = "ATOMIC_WRITE_MAX_OPEN_RETRIES";

/// Tunables for [`crate::AtomicWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtomicWriteOptions {
    /// Cap on retries when opening the temporary file fails with
    /// too-many-open-files. `None` retries until the open succeeds.
    pub max_open_retries: Option<u64>,
}

impl AtomicWriteOptions {
    /// Build options from env vars, falling back to unbounded retries.
    pub fn from_env() -> Self {
        let max_open_retries = std::env::var(MAX_OPEN_RETRIES_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|value| *value > 0);
        Self { max_open_retries }
    }

    /// Returns true when another open attempt is allowed after `retries`
    /// previous retries.
    pub fn allows_open_retry(self, retries: u64) -> bool {
        match self.max_open_retries {
            Some(limit) => retries < limit,
            None => true,
        }
    }
}

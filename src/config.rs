use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes per page, including header
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Number of pages cached by a buffer pool
pub const DEFAULT_POOL_SIZE: usize = 50;

/// How long a lock request waits before the requesting transaction is aborted
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 100;

const MIN_PAGE_SIZE: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("pool size must be > 0")]
    EmptyPool,
    #[error("page size {0} is smaller than {}", MIN_PAGE_SIZE)]
    PageTooSmall(usize),
    #[error("page size {config} does not match the store's {store}")]
    PageSizeMismatch { config: usize, store: usize },
}

/// Process-scoped settings handed to the page store and the buffer pool.
///
/// Nothing reads these from a global: every instance gets its own copy, so
/// tests can run pools with tiny pages side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub page_size: usize,
    pub pool_size: usize,
    pub lock_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl Config {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.pool_size == 0 {
            return Err(Error::EmptyPool);
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err(Error::PageTooSmall(self.page_size));
        }
        Ok(())
    }
}

use super::entity::PageHandle;
use crate::lock::{self, entity::LockMode};
use crate::storage::entity::{PageId, TableId};
use crate::tx::TransactionId;

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Aborted(#[from] lock::manager::Error),
    #[error("no clean page available for eviction in buffer pool")]
    CacheExhausted,
    #[error("page {0} was fetched with a shared lock")]
    ReadOnly(PageId),
    #[error("{tid} does not hold an exclusive lock on page {page_id}")]
    NotLocked { tid: TransactionId, page_id: PageId },
}

impl Error {
    // The issuing transaction has to be rolled back
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }
}

pub trait BufferPoolManager: Send + Sync {
    fn page_size(&self) -> usize;
    // Fetches the page after locking it for `tid`; may block on the lock
    fn get_page(&self, tid: TransactionId, page_id: PageId, mode: LockMode)
        -> Result<PageHandle, Error>;
    // Appends a zeroed page to the table and returns it locked exclusively
    fn allocate_page(&self, tid: TransactionId, table_id: TableId) -> Result<PageHandle, Error>;
    fn page_count(&self, table_id: TableId) -> Result<u32, Error>;
    fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool;
    // Gives up a single lock before commit. Breaks two-phase locking unless
    // the caller knows the page was neither read for a decision nor written.
    fn release_page(&self, tid: TransactionId, page_id: PageId);
    // Forces (commit) or rolls back (abort) every page `tid` dirtied, then
    // releases all its locks
    fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<(), Error>;
    fn commit(&self, tid: TransactionId) -> Result<(), Error> {
        self.transaction_complete(tid, true)
    }
    fn abort(&self, tid: TransactionId) -> Result<(), Error> {
        self.transaction_complete(tid, false)
    }
    // Writes the cached page to storage if it is dirty
    fn flush_page(&self, page_id: PageId) -> Result<(), Error>;
    // Writes every page dirtied by `tid`
    fn flush_pages(&self, tid: TransactionId) -> Result<(), Error>;
    // Writes every dirty cached page, stopping at the first failure
    fn flush_all_pages(&self) -> Result<(), Error>;
    // Drops the page from the cache without writing it
    fn discard_page(&self, page_id: PageId);
}

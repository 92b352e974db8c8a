use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

use super::entity::{LockMode, LockRecord};
use crate::storage::entity::PageId;
use crate::tx::TransactionId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{tid} aborted: {mode} lock on page {page_id} not granted within {timeout:?}")]
    Aborted {
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
        timeout: Duration,
    },
}

#[derive(Debug, Default)]
struct LockEntry {
    record: Mutex<LockRecord>,
    released: Condvar,
}

/// Page-granularity lock manager for strict two-phase locking.
///
/// Each page has its own mutex and condition variable; the table mutex is
/// only held while looking up or creating an entry, so unrelated pages never
/// contend. Entries are never removed, so every thread that asks for a page
/// ends up on the same condition variable.
///
/// Deadlocks are broken by timeout: a request that waits longer than
/// `timeout` fails with `Error::Aborted`. Under heavy contention this can
/// abort transactions that were not deadlocked. Waiters are not queued, so
/// a waiter may starve.
#[derive(Debug)]
pub struct LockManager {
    entries: Mutex<HashMap<PageId, Arc<LockEntry>>>,
    // Pages each transaction holds a lock on
    held: Mutex<HashMap<TransactionId, HashSet<PageId>>>,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn entry(&self, page_id: PageId) -> Arc<LockEntry> {
        let mut entries = self.entries.lock();
        Arc::clone(entries.entry(page_id).or_default())
    }

    fn existing_entry(&self, page_id: PageId) -> Option<Arc<LockEntry>> {
        self.entries.lock().get(&page_id).cloned()
    }

    /// Blocks until `tid` holds `mode` on the page.
    ///
    /// A transaction that is the only shared holder gets its lock upgraded
    /// in place when it asks for `Exclusive`.
    pub fn acquire(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> Result<(), Error> {
        let entry = self.entry(page_id);
        let deadline = Instant::now() + self.timeout;
        {
            let mut record = entry.record.lock();
            if record.satisfies(tid, mode) {
                return Ok(());
            }
            while !record.grantable(tid, mode) {
                debug!(%tid, %page_id, %mode, "waiting for lock");
                if entry.released.wait_until(&mut record, deadline).timed_out()
                    && !record.grantable(tid, mode)
                {
                    warn!(%tid, %page_id, %mode, timeout = ?self.timeout, "lock wait timed out");
                    return Err(Error::Aborted {
                        tid,
                        page_id,
                        mode,
                        timeout: self.timeout,
                    });
                }
            }
            record.grant(tid, mode);
        }
        self.held.lock().entry(tid).or_default().insert(page_id);
        Ok(())
    }

    /// Drops whatever lock `tid` has on the page and wakes every waiter.
    pub fn release(&self, tid: TransactionId, page_id: PageId) {
        self.release_record(tid, page_id);
        let mut held = self.held.lock();
        if let Some(pages) = held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                held.remove(&tid);
            }
        }
    }

    pub fn release_all(&self, tid: TransactionId) {
        let pages = self.held.lock().remove(&tid).unwrap_or_default();
        for page_id in pages {
            self.release_record(tid, page_id);
        }
    }

    fn release_record(&self, tid: TransactionId, page_id: PageId) {
        if let Some(entry) = self.existing_entry(page_id) {
            if entry.record.lock().release(tid) {
                entry.released.notify_all();
            }
        }
    }

    pub fn holds(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    pub fn holds_exclusive(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id) == Some(LockMode::Exclusive)
    }

    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        let entry = self.existing_entry(page_id)?;
        let record = entry.record.lock();
        record.mode_of(tid)
    }

    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<_> = self
            .held
            .lock()
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}

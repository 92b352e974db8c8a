use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use super::manager::Error;
use crate::lock::{entity::LockMode, manager::LockManager};
use crate::storage::entity::PageId;
use crate::tx::TransactionId;

/// A cached page: its bytes plus what is needed to undo the owning
/// transaction's changes.
#[derive(Debug, PartialEq, Eq)]
pub struct Page {
    page_id: PageId,
    data: Vec<u8>,
    dirty_owner: Option<TransactionId>,
    // Content before `dirty_owner` first wrote it
    before_image: Option<Vec<u8>>,
    // Uncommitted content has been written to storage by an explicit flush
    flushed: bool,
}

impl Page {
    pub fn new(page_id: PageId, data: Vec<u8>) -> Self {
        Self {
            page_id,
            data,
            dirty_owner: None,
            before_image: None,
            flushed: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn dirty_owner(&self) -> Option<TransactionId> {
        self.dirty_owner
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_owner.is_some()
    }

    pub fn before_image(&self) -> Option<&[u8]> {
        self.before_image.as_deref()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Takes the before-image on the clean to dirty transition.
    /// Returns whether the page was clean.
    pub(crate) fn mark_dirty(&mut self, tid: TransactionId) -> bool {
        if let Some(owner) = self.dirty_owner {
            debug_assert_eq!(owner, tid, "page {} dirtied by two transactions", self.page_id);
            return false;
        }
        self.before_image = Some(self.data.clone());
        self.dirty_owner = Some(tid);
        true
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty_owner = None;
        self.before_image = None;
        self.flushed = false;
    }

    pub(crate) fn mark_flushed(&mut self) {
        if self.is_dirty() {
            self.flushed = true;
        }
    }

    /// Puts the before-image back. Returns whether storage holds the
    /// discarded content and must be rewritten.
    pub(crate) fn rollback(&mut self) -> bool {
        let flushed = self.flushed;
        if let Some(before_image) = self.before_image.take() {
            self.data = before_image;
        }
        self.dirty_owner = None;
        self.flushed = false;
        flushed
    }
}

impl Deref for Page {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// Pages each running transaction has dirtied.
#[derive(Debug, Default)]
pub struct DirtyLedger {
    pages: Mutex<HashMap<TransactionId, HashSet<PageId>>>,
}

impl DirtyLedger {
    pub fn record(&self, tid: TransactionId, page_id: PageId) {
        self.pages.lock().entry(tid).or_default().insert(page_id);
    }

    pub fn pages(&self, tid: TransactionId) -> Vec<PageId> {
        let pages = self.pages.lock();
        sorted(pages.get(&tid).into_iter().flatten().copied())
    }

    pub fn take(&self, tid: TransactionId) -> Vec<PageId> {
        let taken = self.pages.lock().remove(&tid);
        sorted(taken.into_iter().flatten())
    }
}

fn sorted(page_ids: impl Iterator<Item = PageId>) -> Vec<PageId> {
    let mut page_ids: Vec<_> = page_ids.collect();
    page_ids.sort();
    page_ids
}

/// Access to a cached page on behalf of one transaction.
///
/// The page stays pinned in the pool while any handle to it is alive.
/// Writing requires that the handle was fetched in exclusive mode and that
/// the transaction still holds that lock.
#[derive(Debug)]
pub struct PageHandle {
    tid: TransactionId,
    page_id: PageId,
    mode: LockMode,
    buffer: Arc<RwLock<Page>>,
    lock_manager: Arc<LockManager>,
    ledger: Arc<DirtyLedger>,
}

impl PageHandle {
    pub(crate) fn new(
        tid: TransactionId,
        mode: LockMode,
        buffer: Arc<RwLock<Page>>,
        lock_manager: Arc<LockManager>,
        ledger: Arc<DirtyLedger>,
    ) -> Self {
        let page_id = buffer.read().page_id();
        Self {
            tid,
            page_id,
            mode,
            buffer,
            lock_manager,
            ledger,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn tid(&self) -> TransactionId {
        self.tid
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.buffer.read()
    }

    pub fn write(&self) -> Result<PageWriteGuard<'_>, Error> {
        if self.mode != LockMode::Exclusive {
            return Err(Error::ReadOnly(self.page_id));
        }
        if !self.lock_manager.holds_exclusive(self.tid, self.page_id) {
            return Err(Error::NotLocked {
                tid: self.tid,
                page_id: self.page_id,
            });
        }
        let mut page = self.buffer.write();
        if page.mark_dirty(self.tid) {
            trace!(tid = %self.tid, page_id = %self.page_id, "page dirtied");
            self.ledger.record(self.tid, self.page_id);
        }
        Ok(PageWriteGuard { page })
    }
}

/// Mutable view of a page's bytes; the before-image was taken when it was
/// created.
pub struct PageWriteGuard<'a> {
    page: RwLockWriteGuard<'a, Page>,
}

impl Deref for PageWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.page.data
    }
}

impl DerefMut for PageWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page.data
    }
}

use std::collections::HashMap;
use std::io;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::accessor::{
    entity::{RecordId, Tuple},
    method::{self, TableFile},
};
use crate::buffer::{
    entity::{DirtyLedger, Page, PageHandle},
    manager::*,
};
use crate::config::{self, Config};
use crate::lock::{entity::LockMode, manager::LockManager};
use crate::storage::{
    entity::{PageId, TableId},
    manager::StorageManager,
};
use crate::tx::TransactionId;

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash)]
pub struct BufferId(usize);

#[derive(Debug, Default)]
struct Frame {
    usage_count: u64,
    buffer: Option<Arc<RwLock<Page>>>,
}

impl Frame {
    // Clean and not referenced by any handle
    fn is_evictable(&self) -> bool {
        match &self.buffer {
            Some(buffer) => Arc::strong_count(buffer) == 1 && !buffer.read().is_dirty(),
            None => true,
        }
    }
}

struct BufferPool {
    buffers: Vec<Frame>,
    free_list: Vec<BufferId>,
    next_victim_id: BufferId,
}

impl Index<BufferId> for BufferPool {
    type Output = Frame;
    fn index(&self, index: BufferId) -> &Self::Output {
        &self.buffers[index.0]
    }
}

impl IndexMut<BufferId> for BufferPool {
    fn index_mut(&mut self, index: BufferId) -> &mut Self::Output {
        &mut self.buffers[index.0]
    }
}

impl BufferPool {
    fn new(pool_size: usize) -> Self {
        let mut buffers = vec![];
        buffers.resize_with(pool_size, Default::default);
        let free_list = (0..pool_size).rev().map(BufferId).collect();
        Self {
            buffers,
            free_list,
            next_victim_id: BufferId::default(),
        }
    }

    fn size(&self) -> usize {
        self.buffers.len()
    }

    // Clock-sweep over clean, unpinned frames. Dirty frames are never
    // victims: their content may not reach storage before commit.
    fn evict(&mut self) -> Option<BufferId> {
        if let Some(buffer_id) = self.free_list.pop() {
            return Some(buffer_id);
        }
        let pool_size = self.size();
        let mut consecutive_unavailable = 0;
        loop {
            let next_victim_id = self.next_victim_id;
            self.next_victim_id = self.increment_id(next_victim_id);
            let frame = &mut self[next_victim_id];
            if !frame.is_evictable() {
                consecutive_unavailable += 1;
                if consecutive_unavailable >= pool_size {
                    return None;
                }
                continue;
            }
            if frame.usage_count == 0 {
                return Some(next_victim_id);
            }
            frame.usage_count -= 1;
            consecutive_unavailable = 0;
        }
    }

    // Gives back a victim that was not filled
    fn unused(&mut self, buffer_id: BufferId) {
        if self[buffer_id].buffer.is_none() {
            self.free_list.push(buffer_id);
        }
    }

    fn release(&mut self, buffer_id: BufferId) {
        self[buffer_id] = Frame::default();
        self.free_list.push(buffer_id);
    }

    fn increment_id(&self, buffer_id: BufferId) -> BufferId {
        BufferId((buffer_id.0 + 1) % self.size())
    }
}

struct PoolState {
    pool: BufferPool,
    page_table: HashMap<PageId, BufferId>,
}

impl PoolState {
    fn buffer(&self, page_id: PageId) -> Option<&Arc<RwLock<Page>>> {
        self.page_table
            .get(&page_id)
            .and_then(|&buffer_id| self.pool[buffer_id].buffer.as_ref())
    }
}

/// Buffer pool with a no-steal clock-sweep replacement policy.
///
/// Locks are taken in the order pool state, page, storage. A caller must
/// drop every `PageWriteGuard` before calling back into the pool.
pub struct ClockSweepManager<T: StorageManager> {
    disk: Mutex<T>,
    state: Mutex<PoolState>,
    lock_manager: Arc<LockManager>,
    ledger: Arc<DirtyLedger>,
    tables: RwLock<HashMap<TableId, Arc<dyn TableFile>>>,
    page_size: usize,
}

impl<T: StorageManager> ClockSweepManager<T> {
    pub fn new(disk: T, config: &Config) -> Result<Self, config::Error> {
        config.validate()?;
        if disk.page_size() != config.page_size {
            return Err(config::Error::PageSizeMismatch {
                config: config.page_size,
                store: disk.page_size(),
            });
        }
        let state = PoolState {
            pool: BufferPool::new(config.pool_size),
            page_table: HashMap::new(),
        };
        Ok(Self {
            disk: Mutex::new(disk),
            state: Mutex::new(state),
            lock_manager: Arc::new(LockManager::new(config.lock_timeout())),
            ledger: Arc::new(DirtyLedger::default()),
            tables: RwLock::new(HashMap::new()),
            page_size: config.page_size,
        })
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    pub fn cached_pages(&self) -> usize {
        self.state.lock().page_table.len()
    }

    pub fn dirty_pages(&self, tid: TransactionId) -> Vec<PageId> {
        self.ledger.pages(tid)
    }

    pub fn register_table(&self, table: Arc<dyn TableFile>) {
        let table_id = table.table_id();
        debug!(%table_id, "table registered");
        self.tables.write().insert(table_id, table);
    }

    fn table(&self, table_id: TableId) -> Result<Arc<dyn TableFile>, method::Error> {
        self.tables
            .read()
            .get(&table_id)
            .cloned()
            .ok_or(method::Error::UnknownTable(table_id))
    }

    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &Tuple,
    ) -> Result<RecordId, method::Error> {
        self.table(table_id)?.insert_tuple(self, tid, tuple)
    }

    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<(), method::Error> {
        let record_id = tuple.record_id.ok_or(method::Error::MissingRecordId)?;
        self.table(record_id.page_id.table_id)?
            .delete_tuple(self, tid, record_id)
    }

    pub fn scan_table(
        &self,
        tid: TransactionId,
        table_id: TableId,
    ) -> Result<Vec<Tuple>, method::Error> {
        let mut scan = self.table(table_id)?.scan(tid);
        let mut tuples = vec![];
        while let Some(tuple) = scan.next(self)? {
            tuples.push(tuple);
        }
        Ok(tuples)
    }

    fn handle(&self, tid: TransactionId, mode: LockMode, buffer: Arc<RwLock<Page>>) -> PageHandle {
        PageHandle::new(
            tid,
            mode,
            buffer,
            Arc::clone(&self.lock_manager),
            Arc::clone(&self.ledger),
        )
    }

    fn fetch_buffer(&self, page_id: PageId) -> Result<Arc<RwLock<Page>>, Error> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(&buffer_id) = state.page_table.get(&page_id) {
            let frame = &mut state.pool[buffer_id];
            if let Some(buffer) = &frame.buffer {
                frame.usage_count += 1;
                trace!(%page_id, "buffer hit");
                return Ok(Arc::clone(buffer));
            }
        }
        let buffer_id = state.pool.evict().ok_or(Error::CacheExhausted)?;
        let mut data = vec![0; self.page_size];
        if let Err(err) = self.disk.lock().read_page_data(page_id, &mut data) {
            state.pool.unused(buffer_id);
            return Err(err.into());
        }
        let buffer = Arc::new(RwLock::new(Page::new(page_id, data)));
        let evicted = {
            let frame = &mut state.pool[buffer_id];
            frame.usage_count = 1;
            frame.buffer.replace(Arc::clone(&buffer))
        };
        if let Some(evicted) = evicted {
            let evict_page_id = evicted.read().page_id();
            state.page_table.remove(&evict_page_id);
            debug!(page_id = %evict_page_id, "page evicted");
        }
        state.page_table.insert(page_id, buffer_id);
        debug!(%page_id, "page loaded");
        Ok(buffer)
    }

    fn write_back(page: &mut Page, disk: &mut T) -> io::Result<()> {
        if page.is_dirty() {
            disk.write_page_data(page.page_id(), page)?;
            page.mark_flushed();
        }
        Ok(())
    }

    // All or nothing: before-images are kept until every page is written
    // and synced. On failure every page is rolled back and whatever already
    // reached storage is overwritten with its before-image.
    fn force(&self, tid: TransactionId, page_ids: &[PageId]) -> Result<(), Error> {
        let state = self.state.lock();
        let mut disk = self.disk.lock();
        let mut pages: Vec<_> = page_ids
            .iter()
            .filter_map(|&page_id| state.buffer(page_id))
            .map(|buffer| buffer.write())
            .filter(|page| page.dirty_owner() == Some(tid))
            .collect();

        let mut written = 0;
        let mut result = Ok(());
        for page in &pages {
            if let Err(err) = disk.write_page_data(page.page_id(), page) {
                warn!(%tid, page_id = %page.page_id(), %err, "commit write failed");
                result = Err(err);
                break;
            }
            written += 1;
        }
        if result.is_ok() {
            result = disk.sync();
        }
        let err = match result {
            Ok(()) => {
                pages.iter_mut().for_each(|page| page.mark_clean());
                return Ok(());
            }
            Err(err) => err,
        };

        for (index, page) in pages.iter_mut().enumerate() {
            let page_id = page.page_id();
            if page.rollback() || index < written {
                if let Err(err) = disk.write_page_data(page_id, &page[..]) {
                    warn!(%tid, %page_id, %err, "restoring page failed");
                }
            }
        }
        if let Err(err) = disk.sync() {
            warn!(%tid, %err, "sync after failed commit failed");
        }
        Err(err.into())
    }

    fn rollback(&self, tid: TransactionId, page_ids: &[PageId]) -> Result<(), Error> {
        let state = self.state.lock();
        let mut disk = self.disk.lock();
        let mut failure: Option<io::Error> = None;
        let mut rewritten = false;
        for &page_id in page_ids {
            let buffer = match state.buffer(page_id) {
                Some(buffer) => buffer,
                None => continue,
            };
            let mut page = buffer.write();
            if page.dirty_owner() != Some(tid) {
                continue;
            }
            // Storage still holds what an explicit flush wrote
            if page.rollback() {
                match disk.write_page_data(page_id, &page) {
                    Ok(()) => rewritten = true,
                    Err(err) => {
                        warn!(%tid, %page_id, %err, "restoring flushed page failed");
                        failure.get_or_insert(err);
                    }
                }
            }
        }
        if let Some(err) = failure {
            return Err(err.into());
        }
        if rewritten {
            disk.sync()?;
        }
        Ok(())
    }
}

impl<T: StorageManager> BufferPoolManager for ClockSweepManager<T> {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> Result<PageHandle, Error> {
        self.lock_manager.acquire(tid, page_id, mode)?;
        let buffer = self.fetch_buffer(page_id)?;
        Ok(self.handle(tid, mode, buffer))
    }

    fn allocate_page(&self, tid: TransactionId, table_id: TableId) -> Result<PageHandle, Error> {
        let page_id = self.disk.lock().allocate_page(table_id)?;
        debug!(%tid, %page_id, "page allocated");
        self.get_page(tid, page_id, LockMode::Exclusive)
    }

    fn page_count(&self, table_id: TableId) -> Result<u32, Error> {
        Ok(self.disk.lock().page_count(table_id)?)
    }

    fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds(tid, page_id)
    }

    fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.lock_manager.release(tid, page_id);
    }

    fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<(), Error> {
        let page_ids = self.ledger.take(tid);
        let result = if commit {
            self.force(tid, &page_ids)
        } else {
            self.rollback(tid, &page_ids)
        };
        self.lock_manager.release_all(tid);
        match &result {
            Ok(()) => info!(%tid, commit, pages = page_ids.len(), "transaction complete"),
            Err(err) => warn!(%tid, commit, %err, "transaction completed with error"),
        }
        result
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), Error> {
        let state = self.state.lock();
        if let Some(buffer) = state.buffer(page_id) {
            let mut page = buffer.write();
            Self::write_back(&mut page, &mut self.disk.lock())?;
        }
        Ok(())
    }

    fn flush_pages(&self, tid: TransactionId) -> Result<(), Error> {
        for page_id in self.ledger.pages(tid) {
            self.flush_page(page_id)?;
        }
        self.disk.lock().sync()?;
        Ok(())
    }

    fn flush_all_pages(&self) -> Result<(), Error> {
        let state = self.state.lock();
        let mut disk = self.disk.lock();
        let mut page_ids: Vec<_> = state.page_table.keys().copied().collect();
        page_ids.sort();
        for page_id in page_ids {
            if let Some(buffer) = state.buffer(page_id) {
                Self::write_back(&mut buffer.write(), &mut disk)?;
            }
        }
        disk.sync()?;
        Ok(())
    }

    fn discard_page(&self, page_id: PageId) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(buffer_id) = state.page_table.remove(&page_id) {
            state.pool.release(buffer_id);
            debug!(%page_id, "page discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdbms::memory::MemoryManager;
    use std::time::Duration;

    const PAGE_SIZE: usize = 64;
    const TABLE: TableId = TableId(1);

    #[derive(Debug, PartialEq)]
    enum Op {
        Alloc(PageId),
        Read(PageId),
        Write(PageId),
        Sync,
    }

    struct TraceStorage {
        inner: MemoryManager,
        history: Vec<Op>,
        fail_writes: bool,
        // Fails only the n-th write attempt, counted from 1
        fail_nth_write: Option<usize>,
        write_attempts: usize,
    }

    impl TraceStorage {
        // Pages start out filled with their page number
        fn with_pages(count: u32) -> Self {
            let mut inner = MemoryManager::new(PAGE_SIZE);
            for page_no in 0..count {
                let page_id = inner.allocate_page(TABLE).unwrap();
                inner
                    .write_page_data(page_id, &[page_no as u8; PAGE_SIZE])
                    .unwrap();
            }
            Self {
                inner,
                history: vec![],
                fail_writes: false,
                fail_nth_write: None,
                write_attempts: 0,
            }
        }

        fn stored(&mut self, page_id: PageId) -> Vec<u8> {
            let mut data = vec![0; PAGE_SIZE];
            self.inner.read_page_data(page_id, &mut data).unwrap();
            data
        }
    }

    impl StorageManager for TraceStorage {
        fn page_size(&self) -> usize {
            PAGE_SIZE
        }
        fn page_count(&mut self, table_id: TableId) -> io::Result<u32> {
            self.inner.page_count(table_id)
        }
        fn allocate_page(&mut self, table_id: TableId) -> io::Result<PageId> {
            let page_id = self.inner.allocate_page(table_id)?;
            self.history.push(Op::Alloc(page_id));
            Ok(page_id)
        }
        fn read_page_data(&mut self, page_id: PageId, data: &mut [u8]) -> io::Result<()> {
            self.history.push(Op::Read(page_id));
            self.inner.read_page_data(page_id, data)
        }
        fn write_page_data(&mut self, page_id: PageId, data: &[u8]) -> io::Result<()> {
            self.write_attempts += 1;
            if self.fail_writes || self.fail_nth_write == Some(self.write_attempts) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.history.push(Op::Write(page_id));
            self.inner.write_page_data(page_id, data)
        }
        fn sync(&mut self) -> io::Result<()> {
            self.history.push(Op::Sync);
            Ok(())
        }
    }

    fn pid(page_no: u32) -> PageId {
        PageId::new(TABLE, page_no)
    }

    fn bufmgr(pages: u32, pool_size: usize) -> ClockSweepManager<TraceStorage> {
        let config = Config::default()
            .with_page_size(PAGE_SIZE)
            .with_pool_size(pool_size)
            .with_lock_timeout(Duration::from_millis(20));
        ClockSweepManager::new(TraceStorage::with_pages(pages), &config).unwrap()
    }

    #[test]
    fn config_test() {
        let base = Config::default().with_page_size(PAGE_SIZE);
        let empty = base.clone().with_pool_size(0);
        assert_eq!(
            Some(config::Error::EmptyPool),
            ClockSweepManager::new(TraceStorage::with_pages(0), &empty).err()
        );

        let mismatched = base.with_page_size(PAGE_SIZE * 2);
        assert_eq!(
            Some(config::Error::PageSizeMismatch {
                config: PAGE_SIZE * 2,
                store: PAGE_SIZE,
            }),
            ClockSweepManager::new(TraceStorage::with_pages(0), &mismatched).err()
        );
    }

    fn fill(bufmgr: &ClockSweepManager<TraceStorage>, tid: TransactionId, page_no: u32, byte: u8) {
        let handle = bufmgr.get_page(tid, pid(page_no), LockMode::Exclusive).unwrap();
        handle.write().unwrap().fill(byte);
    }

    #[test]
    fn fetch_page_test() {
        let bufmgr = bufmgr(2, 1);
        let tid = TransactionId::new();
        {
            let handle = bufmgr.get_page(tid, pid(0), LockMode::Shared).unwrap();
            assert_eq!(vec![Op::Read(pid(0))], bufmgr.disk.lock().history);
            assert_eq!([0u8; PAGE_SIZE], &handle.read()[..]);

            let _same = bufmgr.get_page(tid, pid(0), LockMode::Shared).unwrap();
            // no storage access(hit the cache)
            assert_eq!(vec![Op::Read(pid(0))], bufmgr.disk.lock().history);

            // the only frame is pinned
            let err = bufmgr.get_page(tid, pid(1), LockMode::Shared).unwrap_err();
            assert!(matches!(err, Error::CacheExhausted));
            assert_eq!(vec![Op::Read(pid(0))], bufmgr.disk.lock().history);
        }
        let handle = bufmgr.get_page(tid, pid(1), LockMode::Shared).unwrap();
        // clean page dropped without a write
        assert_eq!(
            vec![Op::Read(pid(0)), Op::Read(pid(1))],
            bufmgr.disk.lock().history
        );
        assert_eq!([1u8; PAGE_SIZE], &handle.read()[..]);
        assert!(!bufmgr.is_cached(pid(0)));
        assert_eq!(1, bufmgr.cached_pages());
    }

    #[test]
    fn clock_sweep_test() {
        let bufmgr = bufmgr(3, 2);
        let tid = TransactionId::new();
        for _ in 0..3 {
            bufmgr.get_page(tid, pid(0), LockMode::Shared).unwrap();
        }
        bufmgr.get_page(tid, pid(1), LockMode::Shared).unwrap();
        bufmgr.get_page(tid, pid(2), LockMode::Shared).unwrap();
        // the less used page goes first
        assert!(bufmgr.is_cached(pid(0)));
        assert!(!bufmgr.is_cached(pid(1)));
        assert!(bufmgr.is_cached(pid(2)));
    }

    #[test]
    fn no_steal_test() {
        let bufmgr = bufmgr(3, 2);
        let writer = TransactionId::new();
        let reader = TransactionId::new();
        fill(&bufmgr, writer, 0, 0xaa);
        fill(&bufmgr, writer, 1, 0xbb);

        // both frames hold uncommitted data
        let err = bufmgr.get_page(reader, pid(2), LockMode::Shared).unwrap_err();
        assert!(matches!(err, Error::CacheExhausted));
        assert!(!bufmgr
            .disk
            .lock()
            .history
            .iter()
            .any(|op| matches!(op, Op::Write(_))));

        bufmgr.commit(writer).unwrap();
        assert_eq!(
            vec![
                Op::Read(pid(0)),
                Op::Read(pid(1)),
                Op::Write(pid(0)),
                Op::Write(pid(1)),
                Op::Sync,
            ],
            bufmgr.disk.lock().history
        );
        bufmgr.get_page(reader, pid(2), LockMode::Shared).unwrap();
    }

    #[test]
    fn commit_test() {
        let bufmgr = bufmgr(1, 4);
        let tid = TransactionId::new();
        fill(&bufmgr, tid, 0, 7);
        assert_eq!(vec![pid(0)], bufmgr.dirty_pages(tid));

        bufmgr.commit(tid).unwrap();
        assert_eq!(vec![7u8; PAGE_SIZE], bufmgr.disk.lock().stored(pid(0)));
        assert!(bufmgr.dirty_pages(tid).is_empty());
        assert!(!bufmgr.holds_lock(tid, pid(0)));

        let other = TransactionId::new();
        let handle = bufmgr.get_page(other, pid(0), LockMode::Shared).unwrap();
        let page = handle.read();
        assert!(!page.is_dirty());
        assert_eq!(None, page.before_image());
    }

    #[test]
    fn abort_test() {
        let bufmgr = bufmgr(1, 4);
        let writer = TransactionId::new();
        fill(&bufmgr, writer, 0, 9);
        bufmgr.abort(writer).unwrap();
        // rollback never touches storage
        assert_eq!(vec![Op::Read(pid(0))], bufmgr.disk.lock().history);
        assert!(!bufmgr.holds_lock(writer, pid(0)));
        bufmgr.abort(writer).unwrap();

        let reader = TransactionId::new();
        let handle = bufmgr.get_page(reader, pid(0), LockMode::Shared).unwrap();
        assert_eq!([0u8; PAGE_SIZE], &handle.read()[..]);
        assert!(!handle.read().is_dirty());
    }

    #[test]
    fn flush_then_abort_test() {
        let bufmgr = bufmgr(2, 4);
        let tid = TransactionId::new();
        fill(&bufmgr, tid, 1, 5);
        bufmgr.flush_page(pid(1)).unwrap();
        assert_eq!(vec![5u8; PAGE_SIZE], bufmgr.disk.lock().stored(pid(1)));
        {
            let handle = bufmgr.get_page(tid, pid(1), LockMode::Shared).unwrap();
            let page = handle.read();
            assert!(page.is_dirty());
            assert!(page.is_flushed());
        }

        bufmgr.abort(tid).unwrap();
        assert_eq!(vec![1u8; PAGE_SIZE], bufmgr.disk.lock().stored(pid(1)));
        assert_eq!(
            vec![
                Op::Read(pid(1)),
                Op::Write(pid(1)),
                Op::Write(pid(1)),
                Op::Sync,
            ],
            bufmgr.disk.lock().history
        );
    }

    #[test]
    fn flush_all_pages_test() {
        let bufmgr = bufmgr(3, 4);
        let tid = TransactionId::new();
        bufmgr.flush_all_pages().unwrap();
        assert_eq!(vec![Op::Sync], bufmgr.disk.lock().history);

        bufmgr.get_page(tid, pid(0), LockMode::Shared).unwrap();
        fill(&bufmgr, tid, 2, 3);
        fill(&bufmgr, tid, 1, 3);
        bufmgr.flush_all_pages().unwrap();
        // only dirty pages, in page order
        assert_eq!(
            vec![
                Op::Sync,
                Op::Read(pid(0)),
                Op::Read(pid(2)),
                Op::Read(pid(1)),
                Op::Write(pid(1)),
                Op::Write(pid(2)),
                Op::Sync,
            ],
            bufmgr.disk.lock().history
        );

        bufmgr.disk.lock().fail_writes = true;
        let err = bufmgr.flush_all_pages().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn flush_pages_test() {
        let bufmgr = bufmgr(3, 4);
        let a = TransactionId::new();
        let b = TransactionId::new();
        fill(&bufmgr, a, 0, 1);
        fill(&bufmgr, b, 2, 9);
        bufmgr.flush_pages(a).unwrap();
        let mut disk = bufmgr.disk.lock();
        assert_eq!(vec![1u8; PAGE_SIZE], disk.stored(pid(0)));
        assert_eq!(vec![2u8; PAGE_SIZE], disk.stored(pid(2)));
        assert_eq!(Some(&Op::Sync), disk.history.last());
        assert!(!disk.history.contains(&Op::Write(pid(2))));
    }

    #[test]
    fn commit_failure_test() {
        let bufmgr = bufmgr(2, 4);
        let tid = TransactionId::new();
        fill(&bufmgr, tid, 0, 4);
        fill(&bufmgr, tid, 1, 4);
        bufmgr.disk.lock().fail_writes = true;

        let err = bufmgr.commit(tid).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!bufmgr.holds_lock(tid, pid(0)));
        assert!(bufmgr.dirty_pages(tid).is_empty());

        bufmgr.disk.lock().fail_writes = false;
        let reader = TransactionId::new();
        for page_no in 0..2 {
            let handle = bufmgr.get_page(reader, pid(page_no), LockMode::Shared).unwrap();
            let page = handle.read();
            assert!(!page.is_dirty());
            assert_eq!([page_no as u8; PAGE_SIZE], &page[..]);
        }
    }

    #[test]
    fn commit_second_write_fails_test() {
        let bufmgr = bufmgr(2, 4);
        let tid = TransactionId::new();
        fill(&bufmgr, tid, 0, 4);
        fill(&bufmgr, tid, 1, 4);
        bufmgr.disk.lock().fail_nth_write = Some(2);

        let err = bufmgr.commit(tid).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!bufmgr.holds_lock(tid, pid(0)));

        // the page written before the failure is put back in storage
        let mut disk = bufmgr.disk.lock();
        assert_eq!(vec![0u8; PAGE_SIZE], disk.stored(pid(0)));
        assert_eq!(vec![1u8; PAGE_SIZE], disk.stored(pid(1)));
        assert_eq!(
            vec![
                Op::Read(pid(0)),
                Op::Read(pid(1)),
                Op::Write(pid(0)),
                Op::Write(pid(0)),
                Op::Sync,
            ],
            disk.history
        );
        drop(disk);

        let reader = TransactionId::new();
        for page_no in 0..2 {
            let handle = bufmgr.get_page(reader, pid(page_no), LockMode::Shared).unwrap();
            let page = handle.read();
            assert!(!page.is_dirty());
            assert_eq!([page_no as u8; PAGE_SIZE], &page[..]);
        }
    }

    #[test]
    fn discard_page_test() {
        let bufmgr = bufmgr(1, 1);
        let tid = TransactionId::new();
        fill(&bufmgr, tid, 0, 8);
        bufmgr.discard_page(pid(0));
        assert!(!bufmgr.is_cached(pid(0)));
        bufmgr.discard_page(pid(0));

        // reloaded from storage into the freed frame
        let handle = bufmgr.get_page(tid, pid(0), LockMode::Shared).unwrap();
        assert_eq!([0u8; PAGE_SIZE], &handle.read()[..]);
        assert_eq!(
            vec![Op::Read(pid(0)), Op::Read(pid(0))],
            bufmgr.disk.lock().history
        );
    }

    #[test]
    fn allocate_page_test() {
        let bufmgr = bufmgr(1, 2);
        let tid = TransactionId::new();
        let handle = bufmgr.allocate_page(tid, TABLE).unwrap();
        assert_eq!(pid(1), handle.page_id());
        assert_eq!(LockMode::Exclusive, handle.mode());
        assert!(bufmgr.lock_manager().holds_exclusive(tid, pid(1)));
        assert_eq!(2, bufmgr.page_count(TABLE).unwrap());
        assert_eq!(
            vec![Op::Alloc(pid(1)), Op::Read(pid(1))],
            bufmgr.disk.lock().history
        );
    }

    #[test]
    fn read_error_test() {
        let bufmgr = bufmgr(0, 1);
        let tid = TransactionId::new();
        let err = bufmgr.get_page(tid, pid(0), LockMode::Shared).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(0, bufmgr.cached_pages());
        // the frame went back to the free list
        bufmgr.allocate_page(tid, TABLE).unwrap();
        assert_eq!(1, bufmgr.cached_pages());
    }

    #[test]
    fn lock_timeout_test() {
        let bufmgr = bufmgr(1, 2);
        let owner = TransactionId::new();
        let other = TransactionId::new();
        let _handle = bufmgr.get_page(owner, pid(0), LockMode::Exclusive).unwrap();
        let err = bufmgr.get_page(other, pid(0), LockMode::Shared).unwrap_err();
        assert!(err.is_aborted());
        bufmgr.abort(other).unwrap();
        assert!(bufmgr.holds_lock(owner, pid(0)));
    }

    #[test]
    fn release_page_test() {
        let bufmgr = bufmgr(1, 2);
        let tid = TransactionId::new();
        bufmgr.get_page(tid, pid(0), LockMode::Shared).unwrap();
        assert!(bufmgr.holds_lock(tid, pid(0)));
        bufmgr.release_page(tid, pid(0));
        assert!(!bufmgr.holds_lock(tid, pid(0)));
    }
}

use std::mem::size_of;

use zerocopy::{AsBytes, ByteSlice, ByteSliceMut, FromBytes, LayoutVerified, Unaligned};

use crate::accessor::{
    entity::{RecordId, Tuple},
    method::{Error, Iterable, TableFile},
};
use crate::buffer::{entity::PageHandle, manager::BufferPoolManager};
use crate::lock::entity::LockMode;
use crate::storage::entity::{PageId, TableId};
use crate::tx::TransactionId;

#[derive(Debug, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct Header {
    used_slots: [u8; 2],
}

const HEADER_SIZE: usize = size_of::<Header>();

/// Slots that fit a page: each takes `tuple_size` bytes plus one bitmap bit.
/// Capped so that slot ids and the used-slot count fit in a `u16`.
pub fn slot_count(page_size: usize, tuple_size: usize) -> usize {
    let fit = page_size.saturating_sub(HEADER_SIZE) * 8 / (tuple_size * 8 + 1);
    fit.min(usize::from(u16::MAX))
}

/// Heap page layout: header, occupancy bitmap, then fixed-size slots.
pub struct HeapPage<B> {
    header: LayoutVerified<B, Header>,
    bitmap: B,
    slots: B,
    tuple_size: usize,
}

impl<B: ByteSlice> HeapPage<B> {
    pub fn new(bytes: B, tuple_size: usize) -> Result<Self, Error> {
        let page_size = bytes.len();
        let slot_count = slot_count(page_size, tuple_size);
        let (header, body) = LayoutVerified::new_unaligned_from_prefix(bytes).ok_or(
            Error::SlotTooLarge {
                tuple_size,
                page_size,
            },
        )?;
        let (bitmap, rest) = ByteSlice::split_at(body, (slot_count + 7) / 8);
        let (slots, _) = ByteSlice::split_at(rest, slot_count * tuple_size);
        Ok(Self {
            header,
            bitmap,
            slots,
            tuple_size,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len() / self.tuple_size
    }

    pub fn used_slots(&self) -> usize {
        u16::from_le_bytes(self.header.used_slots) as usize
    }

    pub fn is_used(&self, slot_id: usize) -> bool {
        self.bitmap[slot_id / 8] & (1 << (slot_id % 8)) != 0
    }

    pub fn free_slot(&self) -> Option<usize> {
        if self.used_slots() >= self.slot_count() {
            return None;
        }
        (0..self.slot_count()).find(|&slot_id| !self.is_used(slot_id))
    }

    pub fn tuple(&self, slot_id: usize) -> &[u8] {
        &self.slots[self.slot_range(slot_id)]
    }

    fn slot_range(&self, slot_id: usize) -> std::ops::Range<usize> {
        let start = slot_id * self.tuple_size;
        start..start + self.tuple_size
    }
}

impl<B: ByteSliceMut> HeapPage<B> {
    pub fn set_used(&mut self, slot_id: usize, used: bool) {
        if self.is_used(slot_id) == used {
            return;
        }
        let mask = 1 << (slot_id % 8);
        let count = self.used_slots() as u16;
        if used {
            self.bitmap[slot_id / 8] |= mask;
            self.header.used_slots = (count + 1).to_le_bytes();
        } else {
            self.bitmap[slot_id / 8] &= !mask;
            self.header.used_slots = (count - 1).to_le_bytes();
        }
    }

    pub fn tuple_mut(&mut self, slot_id: usize) -> &mut [u8] {
        let range = self.slot_range(slot_id);
        &mut self.slots[range]
    }
}

/// Unordered table of fixed-size tuples, one file of heap pages.
pub struct HeapFile {
    table_id: TableId,
    tuple_size: usize,
}

impl HeapFile {
    pub fn new(table_id: TableId, tuple_size: usize) -> Self {
        assert!(tuple_size > 0, "tuple size must be > 0");
        Self {
            table_id,
            tuple_size,
        }
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    fn has_room(&self, handle: &PageHandle) -> Result<bool, Error> {
        let page = handle.read();
        let heap = HeapPage::new(&page[..], self.tuple_size)?;
        Ok(heap.free_slot().is_some())
    }

    fn place(&self, handle: &PageHandle, slot: &[u8]) -> Result<Option<RecordId>, Error> {
        let mut data = handle.write()?;
        let mut heap = HeapPage::new(&mut data[..], self.tuple_size)?;
        let slot_id = match heap.free_slot() {
            Some(slot_id) => slot_id,
            None => return Ok(None),
        };
        heap.tuple_mut(slot_id).copy_from_slice(slot);
        heap.set_used(slot_id, true);
        Ok(Some(RecordId {
            page_id: handle.page_id(),
            slot_id: slot_id as u16,
        }))
    }
}

impl TableFile for HeapFile {
    fn table_id(&self) -> TableId {
        self.table_id
    }

    // Pages are inspected under shared locks; only a page with a free slot
    // is locked exclusively. A full table grows by one page.
    fn insert_tuple(
        &self,
        bufmgr: &dyn BufferPoolManager,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<RecordId, Error> {
        let page_size = bufmgr.page_size();
        if slot_count(page_size, self.tuple_size) == 0 {
            return Err(Error::SlotTooLarge {
                tuple_size: self.tuple_size,
                page_size,
            });
        }
        let mut slot = vec![0; self.tuple_size];
        tuple.encode_into(&mut slot)?;

        for page_no in 0..bufmgr.page_count(self.table_id)? {
            let page_id = PageId::new(self.table_id, page_no);
            let handle = bufmgr.get_page(tid, page_id, LockMode::Shared)?;
            if !self.has_room(&handle)? {
                continue;
            }
            let handle = bufmgr.get_page(tid, page_id, LockMode::Exclusive)?;
            if let Some(record_id) = self.place(&handle, &slot)? {
                return Ok(record_id);
            }
        }
        let handle = bufmgr.allocate_page(tid, self.table_id)?;
        self.place(&handle, &slot)?.ok_or(Error::SlotTooLarge {
            tuple_size: self.tuple_size,
            page_size,
        })
    }

    fn delete_tuple(
        &self,
        bufmgr: &dyn BufferPoolManager,
        tid: TransactionId,
        record_id: RecordId,
    ) -> Result<(), Error> {
        if record_id.page_id.table_id != self.table_id {
            return Err(Error::NoSuchTuple(record_id));
        }
        let slot_id = usize::from(record_id.slot_id);
        let handle = bufmgr.get_page(tid, record_id.page_id, LockMode::Exclusive)?;
        {
            let page = handle.read();
            let heap = HeapPage::new(&page[..], self.tuple_size)?;
            if slot_id >= heap.slot_count() || !heap.is_used(slot_id) {
                return Err(Error::NoSuchTuple(record_id));
            }
        }
        let mut data = handle.write()?;
        let mut heap = HeapPage::new(&mut data[..], self.tuple_size)?;
        heap.tuple_mut(slot_id).fill(0);
        heap.set_used(slot_id, false);
        Ok(())
    }

    fn scan(&self, tid: TransactionId) -> Box<dyn Iterable> {
        Box::new(HeapScan {
            table_id: self.table_id,
            tuple_size: self.tuple_size,
            tid,
            page_no: 0,
            slot_id: 0,
        })
    }
}

/// Visits every used slot in page order, taking a shared lock on each page.
pub struct HeapScan {
    table_id: TableId,
    tuple_size: usize,
    tid: TransactionId,
    page_no: u32,
    slot_id: usize,
}

impl Iterable for HeapScan {
    fn next(&mut self, bufmgr: &dyn BufferPoolManager) -> Result<Option<Tuple>, Error> {
        let page_count = bufmgr.page_count(self.table_id)?;
        while self.page_no < page_count {
            let page_id = PageId::new(self.table_id, self.page_no);
            let handle = bufmgr.get_page(self.tid, page_id, LockMode::Shared)?;
            let page = handle.read();
            let heap = HeapPage::new(&page[..], self.tuple_size)?;
            while self.slot_id < heap.slot_count() {
                let slot_id = self.slot_id;
                self.slot_id += 1;
                if heap.is_used(slot_id) {
                    let record_id = RecordId {
                        page_id,
                        slot_id: slot_id as u16,
                    };
                    return Ok(Some(Tuple::decode(heap.tuple(slot_id), record_id)?));
                }
            }
            self.page_no += 1;
            self.slot_id = 0;
        }
        Ok(None)
    }
}

use std::collections::HashMap;
use std::io::{Error, ErrorKind, Read, Result, Write};

use crate::storage::{
    entity::{PageId, TableId},
    manager::StorageManager,
};

/// Page store that keeps every table in memory.
pub struct MemoryManager {
    page_size: usize,
    heaps: HashMap<TableId, Vec<Vec<u8>>>,
}

impl MemoryManager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            heaps: HashMap::new(),
        }
    }

    fn row(&self, page_id: PageId) -> Result<&Vec<u8>> {
        self.heaps
            .get(&page_id.table_id)
            .and_then(|heap| heap.get(page_id.page_no as usize))
            .ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, format!("no page {}", page_id)))
    }

    fn row_mut(&mut self, page_id: PageId) -> Result<&mut Vec<u8>> {
        self.heaps
            .get_mut(&page_id.table_id)
            .and_then(|heap| heap.get_mut(page_id.page_no as usize))
            .ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, format!("no page {}", page_id)))
    }
}

impl StorageManager for MemoryManager {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&mut self, table_id: TableId) -> Result<u32> {
        Ok(self.heaps.get(&table_id).map_or(0, |heap| heap.len() as u32))
    }

    fn allocate_page(&mut self, table_id: TableId) -> Result<PageId> {
        let page_size = self.page_size;
        let heap = self.heaps.entry(table_id).or_default();
        let page_id = PageId::new(table_id, heap.len() as u32);
        heap.push(vec![0; page_size]);
        Ok(page_id)
    }

    fn read_page_data(&mut self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        let mut row: &[u8] = self.row(page_id)?;
        row.read_exact(data)
    }

    fn write_page_data(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(Error::new(ErrorKind::InvalidInput, "page size mismatch"));
        }
        let mut row: &mut [u8] = self.row_mut(page_id)?;
        row.write_all(data)
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

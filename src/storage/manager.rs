use super::entity::{PageId, TableId};

use std::io::Result;

pub trait StorageManager: Send {
    // Size in bytes of every page this store reads and writes
    fn page_size(&self) -> usize;
    // Number of pages the table currently has
    fn page_count(&mut self, table_id: TableId) -> Result<u32>;
    // Extends the table by one zeroed page and returns its id
    fn allocate_page(&mut self, table_id: TableId) -> Result<PageId>;
    // Reads the page into `data`
    fn read_page_data(&mut self, page_id: PageId, data: &mut [u8]) -> Result<()>;
    // Writes `data` to the page
    fn write_page_data(&mut self, page_id: PageId, data: &[u8]) -> Result<()>;
    // Makes every previous write durable
    fn sync(&mut self) -> Result<()>;
}

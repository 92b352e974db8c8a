use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{prelude::*, Error, ErrorKind, Result, SeekFrom};
use std::path::{Path, PathBuf};

use crate::storage::{
    entity::{PageId, TableId},
    manager::StorageManager,
};

/// Page store keeping one heap file per table inside a directory.
///
/// Page `n` of table `t` lives at offset `n * page_size` of `<dir>/<t>.tbl`.
pub struct DiskManager {
    dir: PathBuf,
    page_size: usize,
    // Heap files opened so far, by table
    heap_files: HashMap<TableId, File>,
}

impl DiskManager {
    pub fn open(dir: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            page_size,
            heap_files: HashMap::new(),
        })
    }

    pub fn table_path(&self, table_id: TableId) -> PathBuf {
        self.dir.join(format!("{}.tbl", table_id.0))
    }

    fn heap_file(&mut self, table_id: TableId) -> Result<&mut File> {
        if !self.heap_files.contains_key(&table_id) {
            let heap_file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(self.table_path(table_id))?;
            self.heap_files.insert(table_id, heap_file);
        }
        self.heap_files
            .get_mut(&table_id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "heap file vanished"))
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.page_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("expected {} bytes, got {}", self.page_size, len),
            ));
        }
        Ok(())
    }
}

impl StorageManager for DiskManager {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&mut self, table_id: TableId) -> Result<u32> {
        let page_size = self.page_size as u64;
        let len = self.heap_file(table_id)?.metadata()?.len();
        Ok((len / page_size) as u32)
    }

    fn allocate_page(&mut self, table_id: TableId) -> Result<PageId> {
        let page_id = PageId::new(table_id, self.page_count(table_id)?);
        let zeroes = vec![0u8; self.page_size];
        self.write_page_data(page_id, &zeroes)?;
        Ok(page_id)
    }

    fn read_page_data(&mut self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        self.check_len(data.len())?;
        let offset = page_id.offset(self.page_size);
        let heap_file = self.heap_file(page_id.table_id)?;
        heap_file.seek(SeekFrom::Start(offset))?;
        // Fails with UnexpectedEof past the end of the table
        heap_file.read_exact(data)
    }

    fn write_page_data(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        self.check_len(data.len())?;
        let offset = page_id.offset(self.page_size);
        let heap_file = self.heap_file(page_id.table_id)?;
        heap_file.seek(SeekFrom::Start(offset))?;
        heap_file.write_all(data)
    }

    fn sync(&mut self) -> Result<()> {
        for heap_file in self.heap_files.values_mut() {
            heap_file.flush()?;
            heap_file.sync_all()?;
        }
        Ok(())
    }
}

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{PoolError, PoolResult};
use crate::page::PageId;

pub const PAGE_SIZE: usize = 4096;

// Byte-addressable page store over a single file. One DiskManager is shared
// by every instance of a sharded buffer pool, so all methods take &self and
// serialize on an internal file latch.
pub struct DiskManager {
    file: Mutex<File>,
}

impl DiskManager {
    pub fn create(path: &Path) -> PoolResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn open(path: &Path) -> PoolResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> PoolResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(PoolError::InvalidBufferLength {
                expected: PAGE_SIZE,
                got: buf.len(),
            });
        }

        let offset = Self::page_offset(page_id);
        let mut file = self.file.lock();
        let file_size = file.metadata()?.len();

        // A page past the end of the file has never been written and reads
        // as all zeroes; per-instance id strides leave holes in the id-space
        if offset >= file_size {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;

        Ok(())
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> PoolResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(PoolError::InvalidBufferLength {
                expected: PAGE_SIZE,
                got: data.len(),
            });
        }

        let offset = Self::page_offset(page_id);
        let mut file = self.file.lock();
        let file_size = file.metadata()?.len();

        // Extend the file if necessary
        if offset >= file_size {
            file.set_len(offset + PAGE_SIZE as u64)?;
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        // Durable on return
        file.sync_all()?;

        Ok(())
    }

    pub fn num_pages(&self) -> PoolResult<u32> {
        let file_size = self.file.lock().metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id.0 as u64 * PAGE_SIZE as u64
    }
}

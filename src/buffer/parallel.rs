use std::sync::Arc;

use parking_lot::Mutex;

use super::{BufferPoolManager, PageReadGuard, PageWriteGuard};
use crate::disk::DiskManager;
use crate::error::{PoolError, PoolResult};
use crate::page::PageId;
use crate::wal::LogManager;

/// Shards page ownership across `num_instances` buffer pool instances by
/// `page_id mod num_instances`, cutting latch contention. Requests for a
/// given page always route to the same instance; the only shared mutable
/// state is the round-robin cursor used by `new_page`.
pub struct ParallelBufferPoolManager {
    instances: Vec<BufferPoolManager>,
    next_instance: Mutex<usize>,
    pool_size_per_instance: usize,
}

impl ParallelBufferPoolManager {
    pub fn new(
        num_instances: u32,
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");

        let instances = (0..num_instances)
            .map(|index| {
                BufferPoolManager::with_instance(
                    pool_size,
                    num_instances,
                    index,
                    disk_manager.clone(),
                    log_manager.clone(),
                )
            })
            .collect();

        Self {
            instances,
            next_instance: Mutex::new(0),
            pool_size_per_instance: pool_size,
        }
    }

    fn instance_for(&self, page_id: PageId) -> &BufferPoolManager {
        &self.instances[page_id.0 as usize % self.instances.len()]
    }

    /// Allocates a page on the first instance with a frame to spare. The
    /// cursor advances on every attempt, so successive calls spread load
    /// across instances even under pressure.
    pub fn new_page(&self) -> PoolResult<(PageId, PageWriteGuard)> {
        let mut cursor = self.next_instance.lock();
        for _ in 0..self.instances.len() {
            let instance = &self.instances[*cursor];
            *cursor = (*cursor + 1) % self.instances.len();
            match instance.new_page() {
                Ok(page) => return Ok(page),
                Err(PoolError::PoolExhausted) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(PoolError::PoolExhausted)
    }

    pub fn fetch_page(&self, page_id: PageId) -> PoolResult<PageReadGuard> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    pub fn fetch_page_write(&self, page_id: PageId) -> PoolResult<PageWriteGuard> {
        self.instance_for(page_id).fetch_page_write(page_id)
    }

    pub fn flush_page(&self, page_id: PageId) -> PoolResult<bool> {
        self.instance_for(page_id).flush_page(page_id)
    }

    pub fn delete_page(&self, page_id: PageId) -> PoolResult<bool> {
        self.instance_for(page_id).delete_page(page_id)
    }

    pub fn flush_all_pages(&self) -> PoolResult<()> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    /// Total frames across all instances.
    pub fn pool_size(&self) -> usize {
        self.instances.len() * self.pool_size_per_instance
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Frames on the free lists of all instances.
    pub fn free_frame_count(&self) -> usize {
        self.instances.iter().map(|i| i.free_frame_count()).sum()
    }

    /// Pages cached across all instances.
    pub fn resident_page_count(&self) -> usize {
        self.instances.iter().map(|i| i.resident_page_count()).sum()
    }
}

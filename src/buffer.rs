pub mod lru;
pub mod parallel;
pub mod replacer;

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::disk::{DiskManager, PAGE_SIZE};
use crate::error::{PoolError, PoolResult};
use crate::page::PageId;
use crate::wal::LogManager;
use lru::LruReplacer;
use replacer::{FrameId, Replacer};

struct Frame {
    data: Box<[u8; PAGE_SIZE]>,
    page_id: Option<PageId>,
    pin_count: u32,
    is_dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        }
    }

    fn reset(&mut self) {
        self.page_id = None;
        self.pin_count = 0;
        self.is_dirty = false;
        self.data.fill(0);
    }
}

// All of an instance's mutable state lives behind one latch.
struct PoolState {
    frames: Box<[Frame]>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: u32,
}

/// A single buffer pool instance: a fixed array of frames caching pages of
/// the data file, with LRU eviction over unpinned frames. Pages are handed
/// out as scoped guards that pin on construction and unpin on drop.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    state: Mutex<PoolState>,
    replacer: Mutex<Box<dyn Replacer>>,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        Self::with_instance(pool_size, 1, 0, disk_manager, log_manager)
    }

    // Instance `instance_index` of a sharded pool mints and caches only
    // page ids congruent to its index modulo `num_instances`.
    pub fn with_instance(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(pool_size > 0, "pool must hold at least one frame");
        assert!(num_instances > 0, "a pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        // Initially, every frame is on the free list
        let frames: Box<[Frame]> = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list: VecDeque<FrameId> = (0..pool_size as FrameId).collect();

        Self {
            inner: Arc::new(BufferPoolInner {
                state: Mutex::new(PoolState {
                    frames,
                    page_table: HashMap::with_capacity(pool_size),
                    free_list,
                    next_page_id: instance_index,
                }),
                replacer: Mutex::new(Box::new(LruReplacer::new(pool_size))),
                disk_manager,
                log_manager,
                pool_size,
                num_instances,
                instance_index,
            }),
        }
    }

    pub fn new_page(&self) -> PoolResult<(PageId, PageWriteGuard)> {
        let mut state = self.inner.state.lock();

        // Mint the id up front; if every frame is pinned it is discarded,
        // never reused
        let page_id = self.allocate_page(&mut state);
        let frame_id = self.acquire_frame(&mut state)?;

        // Bind the zeroed frame and pin it
        let frame = &mut state.frames[frame_id as usize];
        frame.page_id = Some(page_id);
        frame.pin_count = 1;
        frame.is_dirty = true;
        let data = frame.data.as_mut() as *mut [u8; PAGE_SIZE];

        // Update page table
        state.page_table.insert(page_id, frame_id);
        self.inner.replacer.lock().pin(frame_id);
        trace!("new page {} bound to frame {}", page_id, frame_id);

        Ok((
            page_id,
            PageWriteGuard {
                inner: self.inner.clone(),
                frame_id,
                data,
            },
        ))
    }

    pub fn fetch_page(&self, page_id: PageId) -> PoolResult<PageReadGuard> {
        let (frame_id, data) = self.pin_page(page_id, false)?;
        Ok(PageReadGuard {
            inner: self.inner.clone(),
            frame_id,
            data: data as *const _,
        })
    }

    // Like fetch_page, but the frame is marked dirty up front.
    pub fn fetch_page_write(&self, page_id: PageId) -> PoolResult<PageWriteGuard> {
        let (frame_id, data) = self.pin_page(page_id, true)?;
        Ok(PageWriteGuard {
            inner: self.inner.clone(),
            frame_id,
            data,
        })
    }

    fn pin_page(&self, page_id: PageId, mark_dirty: bool) -> PoolResult<(FrameId, *mut [u8; PAGE_SIZE])> {
        let mut state = self.inner.state.lock();

        // Check if the page is already in the pool; a hit pins the frame
        // whether or not it was evictable before
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &mut state.frames[frame_id as usize];
            frame.pin_count += 1;
            if mark_dirty {
                frame.is_dirty = true;
            }
            let data = frame.data.as_mut() as *mut [u8; PAGE_SIZE];
            self.inner.replacer.lock().pin(frame_id);
            return Ok((frame_id, data));
        }

        // Page not in the pool; take a free or victim frame and read the
        // page in under the latch
        let frame_id = self.acquire_frame(&mut state)?;
        if let Err(err) = self
            .inner
            .disk_manager
            .read_page(page_id, state.frames[frame_id as usize].data.as_mut())
        {
            // The frame is detached from every structure; return it to the
            // free list before surfacing the error
            state.frames[frame_id as usize].reset();
            state.free_list.push_back(frame_id);
            return Err(err);
        }

        // Update the frame's metadata and the page table
        let frame = &mut state.frames[frame_id as usize];
        frame.page_id = Some(page_id);
        frame.pin_count = 1;
        frame.is_dirty = mark_dirty;
        let data = frame.data.as_mut() as *mut [u8; PAGE_SIZE];

        state.page_table.insert(page_id, frame_id);
        self.inner.replacer.lock().pin(frame_id);

        Ok((frame_id, data))
    }

    pub fn flush_page(&self, page_id: PageId) -> PoolResult<bool> {
        let mut state = self.inner.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };

        // Log first, then the page bytes; pin state is unchanged
        let frame = &mut state.frames[frame_id as usize];
        if frame.is_dirty {
            self.flush_log()?;
        }
        self.inner.disk_manager.write_page(page_id, frame.data.as_ref())?;
        frame.is_dirty = false;
        debug!("flushed page {}", page_id);

        Ok(true)
    }

    pub fn flush_all_pages(&self) -> PoolResult<()> {
        let mut state = self.inner.state.lock();
        for frame in state.frames.iter_mut() {
            // Skip frames with no page bound
            let Some(page_id) = frame.page_id else {
                continue;
            };
            if frame.is_dirty {
                self.flush_log()?;
            }
            self.inner.disk_manager.write_page(page_id, frame.data.as_ref())?;
            frame.is_dirty = false;
        }

        Ok(())
    }

    pub fn delete_page(&self, page_id: PageId) -> PoolResult<bool> {
        self.deallocate_page(page_id);

        let mut state = self.inner.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };

        // Someone is still using the page
        if state.frames[frame_id as usize].pin_count > 0 {
            return Ok(false);
        }

        // The frame goes back to the free list without writing the page out
        state.page_table.remove(&page_id);
        state.frames[frame_id as usize].reset();
        state.free_list.push_back(frame_id);
        self.inner.replacer.lock().pin(frame_id);
        trace!("deleted page {}", page_id);

        Ok(true)
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }

    pub fn resident_page_count(&self) -> usize {
        self.inner.state.lock().page_table.len()
    }

    pub fn evictable_frame_count(&self) -> usize {
        self.inner.replacer.lock().size()
    }

    fn allocate_page(&self, state: &mut PoolState) -> PageId {
        // Ids advance by the instance stride
        let page_id = PageId(state.next_page_id);
        state.next_page_id += self.inner.num_instances;
        debug_assert_eq!(page_id.0 % self.inner.num_instances, self.inner.instance_index);
        page_id
    }

    // Deallocation is a bookkeeping notification only; ids are never reused.
    fn deallocate_page(&self, _page_id: PageId) {}

    fn acquire_frame(&self, state: &mut PoolState) -> PoolResult<FrameId> {
        // Always pick from the free list first
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.inner.replacer.lock().evict() else {
            return Err(PoolError::PoolExhausted);
        };

        // The victim's old contents go to disk before rebinding
        if let Some(old_page_id) = state.frames[frame_id as usize].page_id {
            if state.frames[frame_id as usize].is_dirty {
                let write_back = self.flush_log().and_then(|_| {
                    self.inner
                        .disk_manager
                        .write_page(old_page_id, state.frames[frame_id as usize].data.as_ref())
                });
                if let Err(err) = write_back {
                    // The victim stays resident and evictable
                    self.inner.replacer.lock().unpin(frame_id);
                    return Err(err);
                }
                debug!("evicted dirty page {} from frame {}", old_page_id, frame_id);
            }
            state.page_table.remove(&old_page_id);
        }
        state.frames[frame_id as usize].reset();

        Ok(frame_id)
    }

    // The log must be durable before a dirty page reaches disk.
    fn flush_log(&self) -> PoolResult<()> {
        match &self.inner.log_manager {
            Some(log_manager) => log_manager.flush(),
            None => Ok(()),
        }
    }
}

impl BufferPoolInner {
    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let frame = &mut state.frames[frame_id as usize];
        debug_assert!(frame.pin_count > 0, "unpin of a frame with no pins");
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.lock().unpin(frame_id);
        }
    }
}

/// Shared read access to a pinned page. Unpins on drop.
pub struct PageReadGuard {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    data: *const [u8; PAGE_SIZE],
}

impl Deref for PageReadGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.data }
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        self.inner.unpin(self.frame_id);
    }
}

/// Write access to a pinned page. The frame is marked dirty when the guard
/// is created; the flag survives until the page is flushed or written back.
/// Unpins on drop.
pub struct PageWriteGuard {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    data: *mut [u8; PAGE_SIZE],
}

impl Deref for PageWriteGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.data }
    }
}

impl DerefMut for PageWriteGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.data }
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        self.inner.unpin(self.frame_id);
    }
}

// A positive pin count keeps the frame bound for the guard's lifetime, so
// the data pointer stays valid until drop.
unsafe impl Send for PageReadGuard {}
unsafe impl Sync for PageReadGuard {}
unsafe impl Send for PageWriteGuard {}
unsafe impl Sync for PageWriteGuard {}

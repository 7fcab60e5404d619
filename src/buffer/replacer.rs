use std::fmt::Debug;

/// Dense index of a slot in an instance's frame array. Internal to the
/// pool; never handed to callers.
pub type FrameId = u32;

/// Eviction policy over the set of currently evictable frames. The policy
/// knows nothing about pages or disk; the owning pool tells it which frames
/// become pinned or evictable.
pub trait Replacer: Send + Sync + Debug {
    /// Select and remove a frame to evict. Returns None if no frame can be
    /// evicted.
    fn evict(&mut self) -> Option<FrameId>;

    /// Mark a frame as pinned (not evictable). No-op if the frame is not
    /// tracked.
    fn pin(&mut self, frame_id: FrameId);

    /// Mark a frame as evictable. No-op if the frame is already tracked.
    fn unpin(&mut self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;
}

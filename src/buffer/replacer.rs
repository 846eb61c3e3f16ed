use super::buffer_pool_manager::FrameId;

/// The eviction policy the buffer pool consults when every frame is pinned
/// and it needs to steal one back. Only frames marked evictable (pin count
/// zero) are ever handed back by `evict`.
pub trait Replacer: Send {
    fn evict(&mut self) -> Option<FrameId>;
    fn record_access(&mut self, frame_id: FrameId);
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);
    fn remove(&mut self, frame_id: FrameId);
    fn size(&self) -> usize;
}

use std::collections::{HashMap, VecDeque};

use super::buffer_pool_manager::FrameId;
use super::replacer::Replacer;

struct Node {
    is_evictable: bool,
}

/// Classic LRU: `evict` steals the least-recently-accessed frame among the
/// ones currently marked evictable. Accessing a frame (`record_access`)
/// always moves it to the most-recently-used end, whether or not it is
/// currently evictable.
pub struct LruReplacer {
    node_store: HashMap<FrameId, Node>,
    /// Access order, oldest first. A frame can appear at most once; a
    /// repeat access removes the old entry before pushing the new one.
    order: VecDeque<FrameId>,
    current_size: usize,
}

impl LruReplacer {
    pub fn new(_num_frames: usize) -> Self {
        LruReplacer {
            node_store: HashMap::new(),
            order: VecDeque::new(),
            current_size: 0,
        }
    }

    fn touch(&mut self, frame_id: FrameId) {
        if let Some(pos) = self.order.iter().position(|&f| f == frame_id) {
            self.order.remove(pos);
        }
        self.order.push_back(frame_id);
    }
}

impl Replacer for LruReplacer {
    fn evict(&mut self) -> Option<FrameId> {
        let pos = self
            .order
            .iter()
            .position(|f| self.node_store.get(f).is_some_and(|n| n.is_evictable))?;
        let frame_id = self.order.remove(pos).unwrap();
        self.node_store.remove(&frame_id);
        self.current_size -= 1;
        Some(frame_id)
    }

    fn record_access(&mut self, frame_id: FrameId) {
        self.node_store
            .entry(frame_id)
            .or_insert(Node { is_evictable: false });
        self.touch(frame_id);
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let Some(node) = self.node_store.get_mut(&frame_id) else {
            return;
        };
        if node.is_evictable == evictable {
            return;
        }
        node.is_evictable = evictable;
        if evictable {
            self.current_size += 1;
        } else {
            self.current_size -= 1;
        }
    }

    fn remove(&mut self, frame_id: FrameId) {
        let Some(node) = self.node_store.get(&frame_id) else {
            return;
        };
        assert!(node.is_evictable, "removed a non-evictable frame from the replacer");
        self.node_store.remove(&frame_id);
        if let Some(pos) = self.order.iter().position(|&f| f == frame_id) {
            self.order.remove(pos);
        }
        self.current_size -= 1;
    }

    fn size(&self) -> usize {
        self.current_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_sample() {
        let mut replacer = LruReplacer::new(7);

        replacer.record_access(1);
        replacer.record_access(2);
        replacer.record_access(3);
        replacer.record_access(4);
        replacer.record_access(5);
        replacer.record_access(6);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);
        replacer.set_evictable(3, true);
        replacer.set_evictable(4, true);
        replacer.set_evictable(5, true);
        replacer.set_evictable(6, false);
        assert_eq!(5, replacer.size());

        // Order is [1,2,3,4,5,6]; 1, 2, 3 are the oldest evictable frames.
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(3), replacer.evict());
        assert_eq!(2, replacer.size());

        // Order is now [4,5,6]. Re-accessing 4 and 5 moves them to the back,
        // and a fresh frame 3 enters at the back too: [6,3,4,5].
        replacer.record_access(4);
        replacer.record_access(5);
        replacer.record_access(3);
        replacer.set_evictable(3, true);
        assert_eq!(3, replacer.size());

        // 6 is still non-evictable, so the oldest evictable frame is 4.
        assert_eq!(Some(4), replacer.evict());
        assert_eq!(2, replacer.size());

        replacer.set_evictable(6, true);
        assert_eq!(3, replacer.size());
        // Order is [6,5,3]; 6 is now the oldest evictable frame.
        assert_eq!(Some(6), replacer.evict());
        assert_eq!(2, replacer.size());

        assert_eq!(Some(5), replacer.evict());
        assert_eq!(Some(3), replacer.evict());
        assert_eq!(0, replacer.size());
        assert_eq!(None, replacer.evict());
    }

    #[test]
    fn remove_drops_history_without_eviction() {
        let mut replacer = LruReplacer::new(3);
        replacer.record_access(1);
        replacer.set_evictable(1, true);
        assert_eq!(1, replacer.size());
        replacer.remove(1);
        assert_eq!(0, replacer.size());
        assert_eq!(None, replacer.evict());
    }
}

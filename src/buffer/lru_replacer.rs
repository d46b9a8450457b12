use parking_lot::Mutex;

use crate::common::FrameId;

const NIL: u32 = u32::MAX;

#[derive(Clone, Copy)]
struct Node {
    prev: u32,
    next: u32,
    present: bool,
}

/// Recency list state. Frames are referenced by id into a dense node
/// array, so every operation is a constant-time link/unlink.
struct LruList {
    nodes: Vec<Node>,
    /// Most recently unpinned frame
    head: u32,
    /// Least recently unpinned frame (the next victim)
    tail: u32,
    len: usize,
}

impl LruList {
    fn unlink(&mut self, idx: u32) {
        let node = self.nodes[idx as usize];
        if node.prev != NIL {
            self.nodes[node.prev as usize].next = node.next;
        } else {
            self.head = node.next;
        }
        if node.next != NIL {
            self.nodes[node.next as usize].prev = node.prev;
        } else {
            self.tail = node.prev;
        }
        self.nodes[idx as usize].present = false;
        self.len -= 1;
    }

    fn push_front(&mut self, idx: u32) {
        self.nodes[idx as usize] = Node {
            prev: NIL,
            next: self.head,
            present: true,
        };
        if self.head != NIL {
            self.nodes[self.head as usize].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
        self.len += 1;
    }
}

/// LRU replacement policy over unpinned frames.
///
/// A frame becomes a victim candidate when the buffer pool unpins it
/// (pin count reaches zero) and stops being one the moment it is pinned
/// again. The list is ordered by unpin time: `victim` removes and
/// returns the least recently unpinned frame. Unpinning a frame that is
/// already tracked does not refresh its position.
pub struct LruReplacer {
    capacity: usize,
    inner: Mutex<LruList>,
}

impl LruReplacer {
    /// Creates a replacer able to track up to `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            capacity: num_frames,
            inner: Mutex::new(LruList {
                nodes: vec![
                    Node {
                        prev: NIL,
                        next: NIL,
                        present: false,
                    };
                    num_frames
                ],
                head: NIL,
                tail: NIL,
                len: 0,
            }),
        }
    }

    /// Removes and returns the least recently unpinned frame, or None
    /// if no frame is evictable.
    pub fn victim(&self) -> Option<FrameId> {
        let mut list = self.inner.lock();
        if list.len == 0 {
            return None;
        }
        let idx = list.tail;
        list.unlink(idx);
        Some(FrameId::new(idx))
    }

    /// Removes the frame from the candidate list; called after a page
    /// in the frame is pinned.
    pub fn pin(&self, frame_id: FrameId) {
        let mut list = self.inner.lock();
        let idx = frame_id.as_u32();
        if (idx as usize) < list.nodes.len() && list.nodes[idx as usize].present {
            list.unlink(idx);
        }
    }

    /// Adds the frame as the most recent candidate; called when a
    /// page's pin count drops to zero. No-op if the frame is already
    /// tracked or the list is at capacity.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut list = self.inner.lock();
        let idx = frame_id.as_u32();
        if (idx as usize) >= list.nodes.len() {
            return;
        }
        if list.nodes[idx as usize].present || list.len >= self.capacity {
            return;
        }
        list.push_front(idx);
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(id: u32) -> FrameId {
        FrameId::new(id)
    }

    #[test]
    fn test_lru_replacer_empty() {
        let replacer = LruReplacer::new(4);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_oldest_first() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(fid(0));
        replacer.unpin(fid(1));
        assert_eq!(replacer.victim(), Some(fid(0)));
        assert_eq!(replacer.victim(), Some(fid(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_pin_removes_candidate() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(fid(0));
        replacer.unpin(fid(1));
        replacer.unpin(fid(2));
        replacer.pin(fid(1));
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(fid(0)));
        assert_eq!(replacer.victim(), Some(fid(2)));
    }

    #[test]
    fn test_lru_replacer_reunpin_does_not_refresh() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(fid(0));
        replacer.unpin(fid(1));
        replacer.unpin(fid(0));
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(fid(0)));
    }

    #[test]
    fn test_lru_replacer_pin_then_unpin_moves_to_front() {
        let replacer = LruReplacer::new(7);
        for i in 1..=6 {
            replacer.unpin(fid(i));
        }
        replacer.pin(fid(1));
        replacer.unpin(fid(1));
        assert_eq!(replacer.size(), 6);

        // frame 1 was re-unpinned last, so it is now the most recent
        let mut order = Vec::new();
        while let Some(f) = replacer.victim() {
            order.push(f.as_u32());
        }
        assert_eq!(order, vec![2, 3, 4, 5, 6, 1]);
    }

    #[test]
    fn test_lru_replacer_out_of_range_ignored() {
        let replacer = LruReplacer::new(2);
        replacer.unpin(fid(9));
        assert_eq!(replacer.size(), 0);
        replacer.pin(fid(9));
        assert_eq!(replacer.victim(), None);
    }
}

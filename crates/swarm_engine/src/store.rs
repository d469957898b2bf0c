use std::collections::{BTreeMap, BTreeSet};

use swarm_core::chunk::FRAGS_PER_FRAME;

/// Frames older than this many frames behind the newest stored frame are evicted.
pub const RETENTION_FRAMES: u32 = 1000;

/// `chunk_id -> payload` store with a companion `local_bitmap`. The invariant
/// `chunk_id ∈ local_bitmap ⇔ chunk_id ∈ ChunkStore` is maintained by construction:
/// every mutating method updates both together.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: BTreeMap<u32, Vec<u8>>,
    local_bitmap: BTreeSet<u32>,
    newest_frame_id: Option<u32>,
}

impl ChunkStore {
    pub fn new() -> Self {
        ChunkStore::default()
    }

    /// Insert a chunk if not already present. Returns `true` if this was a new
    /// chunk (the caller should flood/forward it); `false` for a duplicate, which
    /// the caller silently drops.
    pub fn insert(&mut self, chunk_id: u32, payload: Vec<u8>) -> bool {
        if self.chunks.contains_key(&chunk_id) {
            return false;
        }
        self.chunks.insert(chunk_id, payload);
        self.local_bitmap.insert(chunk_id);
        let frame_id = chunk_id / FRAGS_PER_FRAME;
        self.newest_frame_id = Some(self.newest_frame_id.map_or(frame_id, |n| n.max(frame_id)));
        self.evict_stale();
        true
    }

    pub fn contains(&self, chunk_id: u32) -> bool {
        self.chunks.contains_key(&chunk_id)
    }

    pub fn get(&self, chunk_id: u32) -> Option<&[u8]> {
        self.chunks.get(&chunk_id).map(|v| v.as_slice())
    }

    pub fn local_bitmap(&self) -> &BTreeSet<u32> {
        &self.local_bitmap
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn evict_stale(&mut self) {
        let Some(newest) = self.newest_frame_id else {
            return;
        };
        let Some(floor_frame) = newest.checked_sub(RETENTION_FRAMES) else {
            return;
        };
        let floor_chunk_id = floor_frame * FRAGS_PER_FRAME;
        let stale: Vec<u32> = self
            .chunks
            .range(..floor_chunk_id)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            self.chunks.remove(&id);
            self.local_bitmap.remove(&id);
        }
    }
}

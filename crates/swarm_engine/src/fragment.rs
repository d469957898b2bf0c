use std::collections::BTreeMap;

use swarm_core::chunk::{ChunkId, FragmentCounts};
use swarm_wire::ChunkPayload;

/// Maximum raw bytes carried by one fragment, before the 8-byte ChunkPayload header.
pub const MAX_FRAG_BYTES: usize = 1000;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FragmentError {
    #[error("frame of {len} bytes needs {needed} fragments, exceeding the {max} cap")]
    TooManyFragments { len: usize, needed: usize, max: u16 },
}

/// Split one frame into `ChunkId -> ChunkPayload` slices of at most `MAX_FRAG_BYTES`
/// bytes each. Used only by the broadcaster.
pub fn fragment_frame(
    frame_id: u32,
    bytes: &[u8],
) -> Result<Vec<(ChunkId, ChunkPayload)>, FragmentError> {
    let total_frags = bytes.len().div_ceil(MAX_FRAG_BYTES).max(1);
    if total_frags > FragmentCounts::MAX_FRAGS as usize {
        return Err(FragmentError::TooManyFragments {
            len: bytes.len(),
            needed: total_frags,
            max: FragmentCounts::MAX_FRAGS,
        });
    }
    let total_frags = total_frags as u16;

    let mut out = Vec::with_capacity(total_frags as usize);
    for (frag_index, chunk) in bytes.chunks(MAX_FRAG_BYTES).enumerate() {
        let frag_index = frag_index as u16;
        let counts = FragmentCounts::new(frag_index, total_frags)
            .expect("frag_index/total_frags derived from the same split, always valid");
        let chunk_id = ChunkId::new(frame_id, frag_index as u32)
            .expect("frag_index < total_frags <= 999 < FRAGS_PER_FRAME");
        out.push((chunk_id, ChunkPayload::new(frame_id, counts, chunk.to_vec())));
    }
    Ok(out)
}

/// Reassembles frames from incoming `ChunkPayload`s. Guarantees at most one emission
/// per `frame_id`, emitted in strictly increasing `frame_id` order, with bounded
/// memory via eviction of completed-or-older frames.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffers: BTreeMap<u32, BTreeMap<u16, Vec<u8>>>,
    meta: BTreeMap<u32, u16>,
    last_completed_frame_id: Option<u32>,
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler::default()
    }

    pub fn last_completed_frame_id(&self) -> Option<u32> {
        self.last_completed_frame_id
    }

    pub fn pending_frames(&self) -> usize {
        self.buffers.len()
    }

    /// Feed one fragment. Returns the assembled frame bytes once all its fragments
    /// have arrived; returns `None` otherwise (including for stale or duplicate
    /// fragments, which are discarded silently).
    pub fn insert(&mut self, payload: ChunkPayload) -> Option<Vec<u8>> {
        if let Some(last) = self.last_completed_frame_id
            && payload.frame_id <= last
        {
            return None;
        }

        let frame_id = payload.frame_id;
        let total_frags = payload.counts.total_frags;
        self.meta.entry(frame_id).or_insert(total_frags);
        let frame_buf = self.buffers.entry(frame_id).or_default();
        frame_buf.insert(payload.counts.frag_index, payload.bytes);

        if frame_buf.len() != total_frags as usize {
            return None;
        }

        let assembled: Vec<u8> = frame_buf.values().flat_map(|b| b.iter().copied()).collect();
        self.last_completed_frame_id = Some(frame_id);
        self.buffers.retain(|&fid, _| fid > frame_id);
        self.meta.retain(|&fid, _| fid > frame_id);
        Some(assembled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    #[test]
    fn fragments_and_reassembles_in_order() {
        let frame: Vec<u8> = (0..7500u32).map(|i| (i % 256) as u8).collect();
        let fragments = fragment_frame(42, &frame).unwrap();
        assert_eq!(fragments.len(), 8);

        let mut order: Vec<_> = fragments.into_iter().collect();
        order.shuffle(&mut rand::rng());

        let mut reassembler = Reassembler::new();
        let mut emitted = None;
        for (i, (_, payload)) in order.iter().enumerate() {
            let out = reassembler.insert(payload.clone());
            if i < order.len() - 1 {
                assert!(out.is_none(), "no emission before the last fragment");
            } else {
                emitted = out;
            }
        }
        assert_eq!(emitted.unwrap(), frame);
        assert_eq!(reassembler.last_completed_frame_id(), Some(42));
        assert_eq!(reassembler.pending_frames(), 0);
    }

    #[test]
    fn rejects_stale_frame_after_completion() {
        let frame = vec![1u8; 10];
        let fragments = fragment_frame(100, &frame).unwrap();
        let mut reassembler = Reassembler::new();
        for (_, payload) in &fragments {
            reassembler.insert(payload.clone());
        }
        assert_eq!(reassembler.last_completed_frame_id(), Some(100));

        let stale = fragment_frame(99, &vec![2u8; 10]).unwrap();
        for (_, payload) in stale {
            assert!(reassembler.insert(payload).is_none());
        }
        assert_eq!(reassembler.pending_frames(), 0);

        let also_stale = fragment_frame(100, &vec![3u8; 10]).unwrap();
        for (_, payload) in also_stale {
            assert!(reassembler.insert(payload).is_none());
        }
    }

    #[test]
    fn enforces_max_999_fragments() {
        let huge = vec![0u8; 1000 * 1000];
        assert!(fragment_frame(1, &huge).is_err());
    }

    #[test]
    fn emits_strictly_increasing_frame_ids() {
        let mut reassembler = Reassembler::new();
        let mut last_emitted = None;
        for frame_id in [0u32, 1, 2, 5, 10] {
            let fragments = fragment_frame(frame_id, &vec![7u8; 5]).unwrap();
            for (_, payload) in fragments {
                if let Some(bytes) = reassembler.insert(payload) {
                    assert_eq!(bytes, vec![7u8; 5]);
                    if let Some(prev) = last_emitted {
                        assert!(frame_id > prev);
                    }
                    last_emitted = Some(frame_id);
                }
            }
        }
        assert_eq!(last_emitted, Some(10));
    }
}

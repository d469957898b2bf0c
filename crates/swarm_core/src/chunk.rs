use crate::{Error, Result};

/// Compile-time upper bound on fragments per frame. `chunk_id = frame_id * FRAGS_PER_FRAME
/// + frag_index`, so this also bounds how many distinct chunk_ids one frame can own.
pub const FRAGS_PER_FRAME: u32 = 1000;

/// A fully-qualified chunk identifier: `frame_id * FRAGS_PER_FRAME + frag_index`.
///
/// Newtype over `u32` so frame/fragment arithmetic lives in one place instead of being
/// re-derived at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(u32);

impl ChunkId {
    pub fn new(frame_id: u32, frag_index: u32) -> Result<Self> {
        if frag_index >= FRAGS_PER_FRAME {
            return Err(Error::FragIndexOutOfRange {
                frag_index,
                bound: FRAGS_PER_FRAME,
            });
        }
        Ok(ChunkId(frame_id * FRAGS_PER_FRAME + frag_index))
    }

    pub const fn from_raw(raw: u32) -> Self {
        ChunkId(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn frame_id(self) -> u32 {
        self.0 / FRAGS_PER_FRAME
    }

    pub const fn frag_index(self) -> u32 {
        self.0 % FRAGS_PER_FRAME
    }
}

impl From<ChunkId> for u32 {
    fn from(id: ChunkId) -> u32 {
        id.0
    }
}

impl From<u32> for ChunkId {
    fn from(raw: u32) -> Self {
        ChunkId::from_raw(raw)
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-frame fragmentation metadata: where a single fragment sits within its frame.
///
/// `total_frags` bounds `frag_index` the same way `FRAGS_PER_FRAME` bounds chunk_ids, but
/// at the (much smaller) per-frame granularity the wire format actually carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentCounts {
    pub total_frags: u16,
    pub frag_index: u16,
}

impl FragmentCounts {
    /// The hard cap the source enforces: N <= 999 fragments per frame.
    pub const MAX_FRAGS: u16 = 999;

    pub fn new(frag_index: u16, total_frags: u16) -> Result<Self> {
        if total_frags == 0 || total_frags > Self::MAX_FRAGS {
            return Err(Error::TooManyFragments {
                total_frags,
                bound: Self::MAX_FRAGS,
            });
        }
        if frag_index >= total_frags {
            return Err(Error::FragIndexOutOfRange {
                frag_index: frag_index as u32,
                bound: total_frags as u32,
            });
        }
        Ok(FragmentCounts {
            total_frags,
            frag_index,
        })
    }
}

use byteorder::{BE, ByteOrder};
use swarm_core::chunk::FragmentCounts;

const HEADER_LEN: usize = 8;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    #[error("chunk payload too short: got {got} bytes, need at least {HEADER_LEN}")]
    TooShort { got: usize },
    #[error("frag_index {frag_index} >= total_frags {total_frags}")]
    FragIndexOutOfRange { frag_index: u16, total_frags: u16 },
    #[error("total_frags {0} exceeds the 999 fragment cap")]
    TooManyFragments(u16),
}

/// The binary framing of a DATA payload for media chunks: a fragment of one frame,
/// tagged with enough metadata for the reassembler to place it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPayload {
    pub frame_id: u32,
    pub counts: FragmentCounts,
    pub bytes: Vec<u8>,
}

impl ChunkPayload {
    pub fn new(frame_id: u32, counts: FragmentCounts, bytes: Vec<u8>) -> Self {
        ChunkPayload {
            frame_id,
            counts,
            bytes,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.bytes.len()];
        BE::write_u32(&mut buf[0..4], self.frame_id);
        BE::write_u16(&mut buf[4..6], self.counts.total_frags);
        BE::write_u16(&mut buf[6..8], self.counts.frag_index);
        buf[HEADER_LEN..].copy_from_slice(&self.bytes);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
        if bytes.len() < HEADER_LEN {
            return Err(PayloadError::TooShort { got: bytes.len() });
        }
        let frame_id = BE::read_u32(&bytes[0..4]);
        let total_frags = BE::read_u16(&bytes[4..6]);
        let frag_index = BE::read_u16(&bytes[6..8]);
        if total_frags == 0 || total_frags > FragmentCounts::MAX_FRAGS {
            return Err(PayloadError::TooManyFragments(total_frags));
        }
        if frag_index >= total_frags {
            return Err(PayloadError::FragIndexOutOfRange {
                frag_index,
                total_frags,
            });
        }
        Ok(ChunkPayload {
            frame_id,
            counts: FragmentCounts {
                total_frags,
                frag_index,
            },
            bytes: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_chunk_payload() {
        for frag_index in 0u16..8 {
            let counts = FragmentCounts::new(frag_index, 8).unwrap();
            let p = ChunkPayload::new(42, counts, vec![frag_index as u8; 1000]);
            let encoded = p.encode();
            let decoded = ChunkPayload::decode(&encoded).unwrap();
            assert_eq!(decoded, p);
        }
    }

    #[test]
    fn rejects_frag_index_ge_total() {
        let mut buf = vec![0u8; HEADER_LEN];
        BE::write_u32(&mut buf[0..4], 1);
        BE::write_u16(&mut buf[4..6], 3);
        BE::write_u16(&mut buf[6..8], 3);
        assert!(matches!(
            ChunkPayload::decode(&buf),
            Err(PayloadError::FragIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_total_frags_over_cap() {
        let mut buf = vec![0u8; HEADER_LEN];
        BE::write_u32(&mut buf[0..4], 1);
        BE::write_u16(&mut buf[4..6], 1000);
        BE::write_u16(&mut buf[6..8], 0);
        assert!(matches!(
            ChunkPayload::decode(&buf),
            Err(PayloadError::TooManyFragments(1000))
        ));
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(matches!(
            ChunkPayload::decode(&[0u8; 4]),
            Err(PayloadError::TooShort { got: 4 })
        ));
    }
}

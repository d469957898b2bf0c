/// REQUEST payloads are a UTF-8 decimal `chunk_id`, not a binary field — this keeps
/// the message trivially loggable.
pub fn encode(chunk_id: u32) -> Vec<u8> {
    chunk_id.to_string().into_bytes()
}

pub fn decode(payload: &[u8]) -> Option<u32> {
    std::str::from_utf8(payload).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        for id in [0u32, 1, 4294967295] {
            assert_eq!(decode(&encode(id)), Some(id));
        }
    }

    #[test]
    fn rejects_non_decimal() {
        assert_eq!(decode(b"not-a-number"), None);
        assert_eq!(decode(&[0xff, 0xfe]), None);
    }
}

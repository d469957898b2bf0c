/// PING/PONG payloads are a UTF-8 decimal seconds timestamp; PONG simply echoes
/// back whatever bytes it received in the PING.
pub fn encode(seconds: f64) -> Vec<u8> {
    seconds.to_string().into_bytes()
}

pub fn decode(payload: &[u8]) -> Option<f64> {
    std::str::from_utf8(payload).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let ts = 1_753_000_000.123;
        assert_eq!(decode(&encode(ts)), Some(ts));
    }
}

use serde::{Deserialize, Serialize};
use swarm_core::Role;

/// One entry of a PEER_LIST payload: `(host, port, role)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerListEntry {
    pub host: String,
    pub port: u16,
    pub role: Role,
}

pub fn encode(entries: &[PeerListEntry]) -> Vec<u8> {
    serde_json::to_vec(entries).expect("peer list always serializes")
}

pub fn decode(bytes: &[u8]) -> Result<Vec<PeerListEntry>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let entries = vec![
            PeerListEntry {
                host: "127.0.0.1".to_string(),
                port: 10001,
                role: Role::Broadcaster,
            },
            PeerListEntry {
                host: "10.0.0.2".to_string(),
                port: 10002,
                role: Role::Viewer,
            },
        ];
        let encoded = encode(&entries);
        assert_eq!(decode(&encoded).unwrap(), entries);
    }
}

use serde::{Deserialize, Serialize};
use swarm_core::Role;

/// HANDSHAKE payload: `{"role": "broadcaster"|"viewer"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub role: Role,
}

impl HandshakePayload {
    pub fn new(role: Role) -> Self {
        HandshakePayload { role }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("HandshakePayload always serializes")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

use byteorder::{BE, ByteOrder};

use crate::header::{HEADER_LEN, MsgType, PROTOCOL_VERSION};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PacketError {
    #[error("packet too short: got {got} bytes, need at least {HEADER_LEN}")]
    TooShort { got: usize },
    #[error("payload_len {declared} exceeds available bytes {available}")]
    PayloadTruncated { declared: u16, available: usize },
    #[error("unknown msg_type byte {0}")]
    UnknownMsgType(u8),
}

/// A decoded datagram: the fixed 16-byte header plus its opaque payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub version: u8,
    pub msg_type: MsgType,
    /// chunk_id for DATA, 0 for every other message type.
    pub seq: u32,
    /// Sender's clock at send time, in seconds.
    pub timestamp: f64,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(msg_type: MsgType, seq: u32, timestamp: f64, payload: Vec<u8>) -> Self {
        Packet {
            version: PROTOCOL_VERSION,
            msg_type,
            seq,
            timestamp,
            payload,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        buf[0] = self.version;
        buf[1] = self.msg_type.as_u8();
        BE::write_u32(&mut buf[2..6], self.seq);
        BE::write_f64(&mut buf[6..14], self.timestamp);
        BE::write_u16(&mut buf[14..16], self.payload.len() as u16);
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_LEN {
            return Err(PacketError::TooShort { got: bytes.len() });
        }
        let version = bytes[0];
        let msg_type_byte = bytes[1];
        let seq = BE::read_u32(&bytes[2..6]);
        let timestamp = BE::read_f64(&bytes[6..14]);
        let payload_len = BE::read_u16(&bytes[14..16]);
        let available = bytes.len() - HEADER_LEN;
        if available < payload_len as usize {
            return Err(PacketError::PayloadTruncated {
                declared: payload_len,
                available,
            });
        }
        let msg_type = MsgType::try_from(msg_type_byte).map_err(PacketError::UnknownMsgType)?;
        let payload = bytes[HEADER_LEN..HEADER_LEN + payload_len as usize].to_vec();
        Ok(Packet {
            version,
            msg_type,
            seq,
            timestamp,
            payload,
        })
    }
}

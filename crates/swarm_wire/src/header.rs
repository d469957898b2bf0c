/// Wire message types. Values are fixed by the protocol and must not be
/// renumbered without bumping `PROTOCOL_VERSION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Handshake = 1,
    Heartbeat = 2,
    Bitmap = 3,
    Request = 4,
    Data = 5,
    PeerList = 6,
    Ping = 7,
    Pong = 8,
    StatsReport = 9,
}

impl MsgType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MsgType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            1 => MsgType::Handshake,
            2 => MsgType::Heartbeat,
            3 => MsgType::Bitmap,
            4 => MsgType::Request,
            5 => MsgType::Data,
            6 => MsgType::PeerList,
            7 => MsgType::Ping,
            8 => MsgType::Pong,
            9 => MsgType::StatsReport,
            other => return Err(other),
        })
    }
}

/// Current wire protocol version, carried in every packet's `version` field.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header size in bytes: version(1) + msg_type(1) + seq(4) + timestamp(8) + payload_len(2).
pub const HEADER_LEN: usize = 16;

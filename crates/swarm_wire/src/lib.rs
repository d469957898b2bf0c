pub mod bitmap;
pub mod chunk_payload;
pub mod handshake;
pub mod header;
pub mod packet;
pub mod peer_list;
pub mod request;
pub mod timestamp_payload;

pub use bitmap::BitmapError;
pub use chunk_payload::{ChunkPayload, PayloadError};
pub use handshake::HandshakePayload;
pub use header::{HEADER_LEN, MsgType, PROTOCOL_VERSION};
pub use packet::{Packet, PacketError};
pub use peer_list::PeerListEntry;

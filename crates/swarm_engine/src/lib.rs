pub mod error;
pub mod fragment;
pub mod node;
pub mod peer;
pub mod peer_table;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use error::NodeError;
pub use fragment::Reassembler;
pub use node::{Node, NodeConfig};
pub use peer::Peer;
pub use peer_table::PeerTable;
pub use stats::StatsSink;
pub use store::ChunkStore;

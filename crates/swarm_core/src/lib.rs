pub mod chunk;
mod error;
pub mod role;
pub mod speed_estimator;

pub use chunk::{ChunkId, FragmentCounts};
pub use error::Error;
pub use role::Role;

pub type Result<T> = std::result::Result<T, Error>;

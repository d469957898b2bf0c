#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("frag_index {frag_index} out of range, must be < {bound}")]
    FragIndexOutOfRange { frag_index: u32, bound: u32 },
    #[error("total_frags {total_frags} exceeds bound {bound}")]
    TooManyFragments { total_frags: u16, bound: u16 },
    #[error("unknown role {0:?}")]
    UnknownRole(String),
}

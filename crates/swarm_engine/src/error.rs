use std::net::SocketAddr;

/// Errors at the node's spawn boundaries: socket setup and explicit connect. The
/// steady-state packet-handling path never returns an error upward — every
/// per-packet failure is caught, logged and dropped at the point of occurrence, so
/// this type only needs to cover startup failures.
#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("failed to bind UDP socket on {addr}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine local address reachable from {dest}")]
    SelfAddressDiscovery {
        dest: std::net::IpAddr,
        #[source]
        source: std::io::Error,
    },
}

use std::net::SocketAddr;

/// Errors that can occur in datagram transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the local socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to associate the socket with the remote target.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The target host name did not resolve to an IPv4 address.
    #[error("failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A send or receive was attempted before `connect`.
    #[error("socket is not connected to a target")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, TransportError>;

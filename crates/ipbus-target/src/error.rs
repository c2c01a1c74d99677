use std::net::SocketAddr;
use std::time::Duration;

use ipbus_packet::{ErrorCategory, PacketError};
use ipbus_transport::TransportError;

/// Errors that can occur in target session operations.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The session is offline; nothing was sent.
    #[error("target is offline")]
    Offline,

    /// No datagram arrived before the response timeout.
    #[error("no response from {peer} within {timeout:?}")]
    NoResponse { peer: SocketAddr, timeout: Duration },

    /// A zero-length datagram arrived.
    #[error("empty response, no IPbus on {0}")]
    EmptyResponse(SocketAddr),

    /// The reply is too long, not word aligned, or carries the wrong packet header.
    #[error("incorrect response ({bytes} bytes)")]
    IncorrectResponse { bytes: usize },

    /// The status reply has the wrong size or header.
    #[error("unexpected status response ({bytes} bytes)")]
    UnexpectedStatus { bytes: usize },

    /// The socket accepted fewer bytes than the request holds.
    #[error("sending packet failed: {sent} of {expected} bytes written")]
    SendFailed { sent: usize, expected: usize },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Packet building or response validation error.
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// The heartbeat thread could not be started.
    #[error("failed to start heartbeat thread: {0}")]
    Heartbeat(#[source] std::io::Error),
}

impl TargetError {
    /// Classify the error as network, protocol or caller misuse.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Packet(err) => err.category(),
            Self::Heartbeat(_) => ErrorCategory::Logic,
            _ => ErrorCategory::Network,
        }
    }

    /// True when the target simply did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::NoResponse { .. })
    }
}

pub type Result<T> = std::result::Result<T, TargetError>;

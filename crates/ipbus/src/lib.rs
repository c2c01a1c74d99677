//! IPbus register access over UDP.
//!
//! ipbus reads and writes memory-mapped registers on remote hardware using
//! the IPbus 2.0 control protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: Blocking UDP datagram transport
//! - [`packet`]: Header codec, packet builder and response validation
//! - [`target`]: Sessions, liveness tracking, heartbeat and a simulated target

/// Re-export transport types.
pub mod transport {
    pub use ipbus_transport::*;
}

/// Re-export packet types.
pub mod packet {
    pub use ipbus_packet::*;
}

/// Re-export target types.
pub mod target {
    pub use ipbus_target::*;
}

pub use ipbus_packet::{ErrorCategory, Event, Packet, TransactionKind};
pub use ipbus_target::{Device, Heartbeat, Session, Target, TargetConfig, TargetError};

//! Blocking UDP datagram transport for IPbus targets.
//!
//! This is the lowest layer of the ipbus stack. A target is reached over a
//! single connected UDP socket; everything above talks to it through the
//! [`DatagramSocket`] trait so the session logic can be exercised against
//! in-memory sockets in tests.

pub mod error;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use traits::DatagramSocket;
pub use udp::{resolve, UdpTransport};
